//! API models

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jenkins_models::SystemInfo;
use serde::{Deserialize, Serialize};

pub const CODE_OK: u16 = 200;

/// Response envelope carried by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Paginated list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub total: u64,
    pub list: Vec<T>,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
}

/// One application+environment pair in a campaign request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationTarget {
    pub app_id: u64,
    pub environment: String,
}

/// Body of `POST /apps/deployment/quick`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuickDeploymentRequest {
    pub title: String,
    #[serde(default)]
    pub business_group_id: u64,
    #[serde(default)]
    pub business_dept_id: u64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub applications: Vec<ApplicationTarget>,
}

/// Body of `POST /apps/deployment/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteQuickDeploymentRequest {
    pub deployment_id: u64,
    /// 1 = parallel (default), 2 = serial
    #[serde(default)]
    pub execution_mode: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteAccepted {
    pub deployment_id: u64,
    pub status: u8,
    pub execution_mode: u8,
}

/// Query of `GET /apps/deployment/list`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default, rename = "pageSize")]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub business_group_id: Option<u64>,
    #[serde(default)]
    pub business_dept_id: Option<u64>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub status: Option<u8>,
    #[serde(default)]
    pub creator_id: Option<u64>,
}

/// Query of the task log endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub html: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: u64,
    pub status: u8,
    pub status_text: String,
    pub build_number: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds
    pub duration: Option<i64>,
    pub error_message: Option<String>,
    pub log_url: Option<String>,
    pub progress: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStatusResponse {
    pub deployment_id: u64,
    pub status: u8,
    pub status_text: String,
    pub task_count: u32,
    pub terminal_count: u32,
    pub succeeded_count: u32,
    pub failed_count: u32,
    pub progress: u8,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLogResponse {
    pub task_id: u64,
    pub build_number: u64,
    pub text: String,
    pub next_start: u64,
    pub has_more: bool,
}

/// Query of `GET /apps/deployment/applications`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployableQuery {
    #[serde(default)]
    pub business_group_id: Option<u64>,
    #[serde(default)]
    pub business_dept_id: Option<u64>,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployableApplication {
    pub app_id: u64,
    pub app_name: String,
    pub app_code: String,
    pub environment: String,
    pub can_deploy: bool,
    pub reason: Option<String>,
}

/// Configured build server, without credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServerInfo {
    pub id: u64,
    pub alias: String,
    pub url: String,
    pub username: String,
}

/// One build server with its address split out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildServerDetail {
    #[serde(flatten)]
    pub server: BuildServerInfo,
    pub host: String,
    pub port: Option<u16>,
}

/// Body of `POST /jenkins/test-connection`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionRequest {
    pub url: String,
    pub username: String,
    /// Password or API token
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub message: String,
    pub system_info: Option<SystemInfo>,
    pub error: Option<String>,
}

/// Body of `POST /apps/jenkins-job/validate`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateJobRequest {
    pub jenkins_server_id: u64,
    pub job_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateJobResponse {
    pub exists: bool,
    pub job_name: String,
    pub job_url: Option<String>,
    pub message: String,
    pub server_id: u64,
}

/// Body of the manual job trigger endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartJobRequest {
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSearchQuery {
    #[serde(default)]
    pub keyword: Option<String>,
}

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}
