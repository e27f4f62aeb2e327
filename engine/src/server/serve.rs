//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::EngineError;
use crate::server::extract::route_not_found;
use crate::server::handlers::{
    applications_handler, campaign_status_handler, cancel_handler, create_handler,
    delete_handler, detail_handler, execute_handler, health_handler, list_handler,
    task_log_handler, task_status_handler, version_handler,
};
use crate::server::jenkins::{
    build_handler, build_log_handler, job_handler, jobs_handler, queue_handler, server_handler,
    servers_handler, start_job_handler, stop_build_handler, system_info_handler,
    test_connection_handler, validate_job_handler,
};
use crate::server::state::ServerState;

/// Build the route table
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Quick deployments
        .route("/apps/deployment/quick", post(create_handler))
        .route("/apps/deployment/execute", post(execute_handler))
        .route("/apps/deployment/list", get(list_handler))
        .route("/apps/deployment/applications", get(applications_handler))
        .route(
            "/apps/deployment/{id}",
            get(detail_handler).delete(delete_handler),
        )
        .route("/apps/deployment/{id}/status", get(campaign_status_handler))
        .route("/apps/deployment/{id}/cancel", post(cancel_handler))
        .route(
            "/apps/deployment/tasks/{task_id}/status",
            get(task_status_handler),
        )
        .route("/apps/deployment/tasks/{task_id}/log", get(task_log_handler))
        // Build servers
        .route("/apps/jenkins-job/validate", post(validate_job_handler))
        .route("/jenkins/servers", get(servers_handler))
        .route("/jenkins/servers/{server_id}", get(server_handler))
        .route("/jenkins/test-connection", post(test_connection_handler))
        .route("/jenkins/{server_id}/jobs", get(jobs_handler))
        .route("/jenkins/{server_id}/jobs/{job}", get(job_handler))
        .route("/jenkins/{server_id}/jobs/{job}/start", post(start_job_handler))
        .route(
            "/jenkins/{server_id}/jobs/{job}/builds/{number}",
            get(build_handler),
        )
        .route(
            "/jenkins/{server_id}/jobs/{job}/builds/{number}/stop",
            post(stop_build_handler),
        )
        .route(
            "/jenkins/{server_id}/jobs/{job}/builds/{number}/log",
            get(build_log_handler),
        )
        .route("/jenkins/{server_id}/system-info", get(system_info_handler))
        .route("/jenkins/{server_id}/queue", get(queue_handler))
        .fallback(route_not_found)
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), EngineError>>, EngineError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| EngineError::ServerError(e.to_string()))
    });

    Ok(handle)
}
