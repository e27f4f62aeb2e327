//! Build server diagnostic handlers

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;

use deploy_api::{
    BuildServerDetail, BuildServerInfo, JobSearchQuery, LogQuery, StartJobRequest,
    TestConnectionRequest, TestConnectionResponse, ValidateJobRequest, ValidateJobResponse,
};
use jenkins_models::{BuildDetail, Job, JobDetail, LogChunk, Queue, QueuedBuild, SystemInfo};
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

use crate::errors::{EngineError, RunnerError};
use crate::http::client::JenkinsClient;
use crate::http::pool::JobCheck;
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::response::{ok, ApiResponse};
use crate::server::state::ServerState;

pub async fn servers_handler(
    State(state): State<Arc<ServerState>>,
) -> ApiResponse<Vec<BuildServerInfo>> {
    ok(state.servers.clone())
}

pub async fn server_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(server_id): ApiPath<u64>,
) -> ApiResponse<BuildServerDetail> {
    let server = state
        .servers
        .iter()
        .find(|server| server.id == server_id)
        .cloned()
        .ok_or(RunnerError::UnknownServer(server_id))?;

    let url = Url::parse(&server.url)
        .map_err(|e| EngineError::Internal(format!("server {} url: {}", server_id, e)))?;
    ok(BuildServerDetail {
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port_or_known_default(),
        server,
    })
}

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn test_connection_handler(
    ApiJson(request): ApiJson<TestConnectionRequest>,
) -> ApiResponse<TestConnectionResponse> {
    if request.url.trim().is_empty() || request.username.trim().is_empty() {
        return Err(EngineError::ValidationError(
            "url and username are required".to_string(),
        ));
    }

    let password = SecretString::from(request.password);
    let result = JenkinsClient::check_connection(
        request.url.trim(),
        request.username.trim(),
        password,
        CONNECTION_TEST_TIMEOUT,
    )
    .await;

    match result {
        Ok(info) => ok(TestConnectionResponse {
            success: true,
            message: "connected".to_string(),
            system_info: Some(info),
            error: None,
        }),
        Err(RunnerError::InvalidInput(e)) => Err(EngineError::ValidationError(e)),
        Err(e) => {
            warn!("Connection test to {} failed: {}", request.url, e);
            ok(TestConnectionResponse {
                success: false,
                message: "connection failed".to_string(),
                system_info: None,
                error: Some(e.to_string()),
            })
        }
    }
}

pub async fn validate_job_handler(
    State(state): State<Arc<ServerState>>,
    ApiJson(request): ApiJson<ValidateJobRequest>,
) -> ApiResponse<ValidateJobResponse> {
    let job_name = request.job_name.trim().to_string();
    if job_name.is_empty() {
        return Err(EngineError::ValidationError("job_name is required".to_string()));
    }

    let check = state
        .runner
        .check_job(request.jenkins_server_id, &job_name)
        .await?;
    let message = check.message();
    let job_url = match check {
        JobCheck::Exists { url } => Some(url),
        _ => None,
    };
    ok(ValidateJobResponse {
        exists: job_url.is_some(),
        job_name,
        job_url,
        message,
        server_id: request.jenkins_server_id,
    })
}

pub async fn jobs_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(server_id): ApiPath<u64>,
    ApiQuery(query): ApiQuery<JobSearchQuery>,
) -> ApiResponse<Vec<Job>> {
    let jobs = match query.keyword.as_deref().map(str::trim) {
        Some(keyword) if !keyword.is_empty() => {
            state.runner.search_jobs(server_id, keyword).await?
        }
        _ => state.runner.list_jobs(server_id).await?,
    };
    ok(jobs)
}

pub async fn job_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((server_id, job)): ApiPath<(u64, String)>,
) -> ApiResponse<JobDetail> {
    ok(state.runner.get_job(server_id, &job).await?)
}

pub async fn start_job_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((server_id, job)): ApiPath<(u64, String)>,
    ApiJson(request): ApiJson<StartJobRequest>,
) -> ApiResponse<QueuedBuild> {
    let queued = state
        .runner
        .start_job(server_id, &job, &request.parameters)
        .await?;
    info!(
        "Started {} on server {} (queue item {})",
        job, server_id, queued.queue_id
    );
    ok(queued)
}

pub async fn build_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((server_id, job, number)): ApiPath<(u64, String, u64)>,
) -> ApiResponse<BuildDetail> {
    ok(state.runner.get_build(server_id, &job, number).await?)
}

pub async fn stop_build_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((server_id, job, number)): ApiPath<(u64, String, u64)>,
) -> ApiResponse<()> {
    state.runner.stop_build(server_id, &job, number).await?;
    info!("Stopped {} #{} on server {}", job, number, server_id);
    ok(())
}

pub async fn build_log_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath((server_id, job, number)): ApiPath<(u64, String, u64)>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> ApiResponse<LogChunk> {
    let chunk = state
        .runner
        .get_build_log(
            server_id,
            &job,
            number,
            query.start.unwrap_or(0),
            query.html.unwrap_or(false),
        )
        .await?;
    ok(chunk)
}

pub async fn system_info_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(server_id): ApiPath<u64>,
) -> ApiResponse<SystemInfo> {
    ok(state.runner.get_system_info(server_id).await?)
}

pub async fn queue_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(server_id): ApiPath<u64>,
) -> ApiResponse<Queue> {
    ok(state.runner.get_queue_info(server_id).await?)
}
