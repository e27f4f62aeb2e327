//! Quick deployment request handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use deploy_api::{
    CampaignStatusResponse, CreateQuickDeploymentRequest, DeployableApplication, DeployableQuery,
    ExecuteAccepted, ExecuteQuickDeploymentRequest, HealthResponse, ListQuery, LogQuery,
    PageResult, TaskLogResponse, TaskStatusResponse, VersionResponse,
};

use crate::errors::EngineError;
use crate::models::deployment::{Campaign, CampaignDetail, ExecutionMode};
use crate::server::extract::{ApiJson, ApiPath, ApiQuery};
use crate::server::response::{ok, operator, ApiResponse};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "rollout".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

pub async fn create_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CreateQuickDeploymentRequest>,
) -> ApiResponse<CampaignDetail> {
    let detail = state
        .orchestrator
        .create(request, operator(&headers))
        .await?;
    ok(detail)
}

pub async fn execute_handler(
    State(state): State<Arc<ServerState>>,
    ApiJson(request): ApiJson<ExecuteQuickDeploymentRequest>,
) -> ApiResponse<ExecuteAccepted> {
    let mode = match request.execution_mode {
        Some(code) => Some(ExecutionMode::from_code(code).ok_or_else(|| {
            EngineError::ValidationError(format!("invalid execution mode {}", code))
        })?),
        None => None,
    };

    let campaign = state
        .orchestrator
        .execute(request.deployment_id, mode)
        .await?;
    ok(ExecuteAccepted {
        deployment_id: campaign.id,
        status: campaign.status.code(),
        execution_mode: campaign.execution_mode.code(),
    })
}

pub async fn list_handler(
    State(state): State<Arc<ServerState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResponse<PageResult<Campaign>> {
    ok(state.orchestrator.list(query).await?)
}

pub async fn detail_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResponse<CampaignDetail> {
    ok(state.orchestrator.get_campaign(id).await?)
}

pub async fn campaign_status_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResponse<CampaignStatusResponse> {
    ok(state.orchestrator.campaign_status(id).await?)
}

pub async fn cancel_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResponse<Campaign> {
    ok(state.orchestrator.cancel(id).await?)
}

pub async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(id): ApiPath<u64>,
) -> ApiResponse<()> {
    state.orchestrator.delete(id).await?;
    ok(())
}

pub async fn task_status_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(task_id): ApiPath<u64>,
) -> ApiResponse<TaskStatusResponse> {
    ok(state.orchestrator.task_status(task_id).await?)
}

pub async fn task_log_handler(
    State(state): State<Arc<ServerState>>,
    ApiPath(task_id): ApiPath<u64>,
    ApiQuery(query): ApiQuery<LogQuery>,
) -> ApiResponse<TaskLogResponse> {
    let log = state
        .orchestrator
        .task_log(
            task_id,
            query.start.unwrap_or(0),
            query.html.unwrap_or(false),
        )
        .await?;
    ok(log)
}

pub async fn applications_handler(
    State(state): State<Arc<ServerState>>,
    ApiQuery(query): ApiQuery<DeployableQuery>,
) -> ApiResponse<Vec<DeployableApplication>> {
    ok(state.orchestrator.deployable_applications(query).await?)
}
