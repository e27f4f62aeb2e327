//! Build runner seam and the per-server Jenkins client pool

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deploy_api::BuildServerInfo;
use jenkins_models::{
    BuildDetail, BuildSummary, Job, JobDetail, LogChunk, Queue, QueueItem, QueuedBuild, SystemInfo,
};
use secrecy::SecretString;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::info;

use crate::errors::RunnerError;
use crate::http::client::JenkinsClient;

/// Operations the engine needs from a build server
///
/// Every call names the configured server it targets.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    fn has_server(&self, server_id: u64) -> bool;

    fn job_url(&self, server_id: u64, job: &str) -> Result<String, RunnerError>;

    async fn list_jobs(&self, server_id: u64) -> Result<Vec<Job>, RunnerError>;

    async fn search_jobs(&self, server_id: u64, keyword: &str) -> Result<Vec<Job>, RunnerError>;

    async fn get_job(&self, server_id: u64, job: &str) -> Result<JobDetail, RunnerError>;

    async fn start_job(
        &self,
        server_id: u64,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<QueuedBuild, RunnerError>;

    async fn get_queue_item(&self, server_id: u64, queue_id: u64) -> Result<QueueItem, RunnerError>;

    async fn cancel_queue_item(&self, server_id: u64, queue_id: u64) -> Result<(), RunnerError>;

    async fn list_builds(&self, server_id: u64, job: &str) -> Result<Vec<BuildSummary>, RunnerError>;

    async fn stop_build(&self, server_id: u64, job: &str, number: u64) -> Result<(), RunnerError>;

    async fn get_build(&self, server_id: u64, job: &str, number: u64)
        -> Result<BuildDetail, RunnerError>;

    async fn get_build_log(
        &self,
        server_id: u64,
        job: &str,
        number: u64,
        start: u64,
        html: bool,
    ) -> Result<LogChunk, RunnerError>;

    async fn get_system_info(&self, server_id: u64) -> Result<SystemInfo, RunnerError>;

    async fn get_queue_info(&self, server_id: u64) -> Result<Queue, RunnerError>;

    /// Look a job up; missing jobs and rejected credentials are answers, not errors
    async fn check_job(&self, server_id: u64, job: &str) -> Result<JobCheck, RunnerError> {
        if !self.has_server(server_id) {
            return Err(RunnerError::UnknownServer(server_id));
        }
        match self.get_job(server_id, job).await {
            Ok(_) => Ok(JobCheck::Exists {
                url: self.job_url(server_id, job)?,
            }),
            Err(RunnerError::NotFound(_)) => Ok(JobCheck::Missing),
            Err(RunnerError::Auth(_)) => Ok(JobCheck::AuthFailed),
            Err(e @ (RunnerError::InvalidInput(_) | RunnerError::UnknownServer(_))) => Err(e),
            Err(e) => Ok(JobCheck::Failed(e.to_string())),
        }
    }
}

/// Result of looking a job name up on a build server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobCheck {
    Exists { url: String },
    Missing,
    AuthFailed,
    Failed(String),
}

impl JobCheck {
    pub fn message(&self) -> String {
        match self {
            JobCheck::Exists { .. } => "job exists".to_string(),
            JobCheck::Missing => "job not found".to_string(),
            JobCheck::AuthFailed => {
                "authentication failed, check the server credentials".to_string()
            }
            JobCheck::Failed(error) => format!("validation failed: {}", error),
        }
    }
}

/// A configured Jenkins controller
#[derive(Debug)]
pub struct ServerEntry {
    pub id: u64,
    pub alias: String,
    pub url: String,
    pub username: String,
    pub api_token: SecretString,
}

/// Pool options
#[derive(Debug, Clone)]
pub struct Options {
    /// In-flight requests allowed per server
    pub max_concurrent_requests: usize,

    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

struct Member {
    alias: String,
    client: JenkinsClient,
    permits: Semaphore,
}

/// Jenkins clients keyed by server id
pub struct JenkinsPool {
    members: HashMap<u64, Member>,
}

impl JenkinsPool {
    pub fn new(servers: Vec<ServerEntry>, options: &Options) -> Result<Self, RunnerError> {
        let permits = options.max_concurrent_requests.max(1);
        let mut members = HashMap::with_capacity(servers.len());

        for server in servers {
            if members.contains_key(&server.id) {
                return Err(RunnerError::InvalidInput(format!(
                    "duplicate build server id {}",
                    server.id
                )));
            }
            let client = JenkinsClient::new(
                &server.url,
                &server.username,
                server.api_token,
                options.request_timeout,
            )?;
            info!("Registered build server {} ({}) at {}", server.id, server.alias, server.url);
            members.insert(
                server.id,
                Member {
                    alias: server.alias,
                    client,
                    permits: Semaphore::new(permits),
                },
            );
        }

        Ok(Self { members })
    }

    /// Configured servers without credentials, ordered by id
    pub fn servers(&self) -> Vec<BuildServerInfo> {
        let mut servers: Vec<BuildServerInfo> = self
            .members
            .iter()
            .map(|(id, member)| BuildServerInfo {
                id: *id,
                alias: member.alias.clone(),
                url: member.client.base_url().to_string(),
                username: member.client.username().to_string(),
            })
            .collect();
        servers.sort_by_key(|server| server.id);
        servers
    }

    fn member(&self, server_id: u64) -> Result<&Member, RunnerError> {
        self.members
            .get(&server_id)
            .ok_or(RunnerError::UnknownServer(server_id))
    }

    async fn acquire(
        &self,
        server_id: u64,
    ) -> Result<(&JenkinsClient, SemaphorePermit<'_>), RunnerError> {
        let member = self.member(server_id)?;
        let permit = member
            .permits
            .acquire()
            .await
            .map_err(|_| RunnerError::Connection(format!("server {} pool closed", server_id)))?;
        Ok((&member.client, permit))
    }
}

#[async_trait]
impl BuildRunner for JenkinsPool {
    fn has_server(&self, server_id: u64) -> bool {
        self.members.contains_key(&server_id)
    }

    fn job_url(&self, server_id: u64, job: &str) -> Result<String, RunnerError> {
        self.member(server_id)?.client.job_url(job)
    }

    async fn list_jobs(&self, server_id: u64) -> Result<Vec<Job>, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.list_jobs().await
    }

    async fn search_jobs(&self, server_id: u64, keyword: &str) -> Result<Vec<Job>, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.search_jobs(keyword).await
    }

    async fn get_job(&self, server_id: u64, job: &str) -> Result<JobDetail, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_job(job).await
    }

    async fn start_job(
        &self,
        server_id: u64,
        job: &str,
        params: &HashMap<String, String>,
    ) -> Result<QueuedBuild, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.start_job(job, params).await
    }

    async fn get_queue_item(&self, server_id: u64, queue_id: u64) -> Result<QueueItem, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_queue_item(queue_id).await
    }

    async fn cancel_queue_item(&self, server_id: u64, queue_id: u64) -> Result<(), RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.cancel_queue_item(queue_id).await
    }

    async fn list_builds(&self, server_id: u64, job: &str) -> Result<Vec<BuildSummary>, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.list_builds(job).await
    }

    async fn stop_build(&self, server_id: u64, job: &str, number: u64) -> Result<(), RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.stop_build(job, number).await
    }

    async fn get_build(
        &self,
        server_id: u64,
        job: &str,
        number: u64,
    ) -> Result<BuildDetail, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_build(job, number).await
    }

    async fn get_build_log(
        &self,
        server_id: u64,
        job: &str,
        number: u64,
        start: u64,
        html: bool,
    ) -> Result<LogChunk, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_build_log(job, number, start, html).await
    }

    async fn get_system_info(&self, server_id: u64) -> Result<SystemInfo, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_system_info().await
    }

    async fn get_queue_info(&self, server_id: u64) -> Result<Queue, RunnerError> {
        let (client, _permit) = self.acquire(server_id).await?;
        client.get_queue_info().await
    }
}
