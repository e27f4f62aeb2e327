//! Quick deployment campaign lifecycle

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use deploy_api::{
    CampaignStatusResponse, CreateQuickDeploymentRequest, DeployableApplication, DeployableQuery,
    ListQuery, PageResult, TaskLogResponse, TaskStatusResponse,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::dispatch::dispatch;
use crate::deploy::fsm::{CampaignEvent, CampaignFsm};
use crate::errors::{EngineError, RunnerError};
use crate::http::pool::BuildRunner;
use crate::models::deployment::{
    elapsed_ms, Campaign, CampaignDetail, CampaignStatus, ExecutionMode, Operator, Task,
    TaskStatus,
};
use crate::resolver::{select_config, JobResolver};
use crate::storage::catalog::ApplicationCatalog;
use crate::storage::deployments::{CampaignFilter, DeploymentStore};
use crate::workers::supervisor::Supervisor;
use crate::workers::task_runner::{self, TaskRunner, CANCELLED};

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct Options {
    /// Environments that may not be targeted
    pub protected_environments: Vec<String>,

    /// Ceiling for a whole campaign
    pub campaign_timeout: Option<Duration>,

    /// How long delete and shutdown wait for a cancelled campaign to settle
    pub stop_wait: Duration,

    pub default_page_size: u32,

    pub max_page_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protected_environments: vec!["prod".to_string()],
            campaign_timeout: None,
            stop_wait: Duration::from_secs(30),
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

struct LiveCampaign {
    cancel: CancellationToken,
    cancel_requested: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

type LiveMap = Arc<Mutex<HashMap<u64, LiveCampaign>>>;

/// Owns campaign lifecycle: create, execute, cancel, query and delete
pub struct Orchestrator {
    store: Arc<dyn DeploymentStore>,
    catalog: Arc<dyn ApplicationCatalog>,
    runner: Arc<dyn BuildRunner>,
    resolver: Arc<JobResolver>,
    task_runner: Arc<TaskRunner>,
    options: Options,
    live: LiveMap,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        catalog: Arc<dyn ApplicationCatalog>,
        runner: Arc<dyn BuildRunner>,
        options: Options,
        runner_options: task_runner::Options,
    ) -> Self {
        let resolver = Arc::new(JobResolver::new(catalog.clone(), runner.clone()));
        let task_runner = Arc::new(TaskRunner::new(
            runner.clone(),
            resolver.clone(),
            runner_options,
        ));

        Self {
            store,
            catalog,
            runner,
            resolver,
            task_runner,
            options,
            live: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The build runner tasks are executed against
    pub fn runner(&self) -> Arc<dyn BuildRunner> {
        self.runner.clone()
    }

    fn is_protected(&self, environment: &str) -> bool {
        self.options
            .protected_environments
            .iter()
            .any(|protected| protected.eq_ignore_ascii_case(environment))
    }

    async fn require_campaign(&self, id: u64) -> Result<Campaign, EngineError> {
        self.store
            .get_campaign(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("deployment {}", id)))
    }

    async fn require_task(&self, task_id: u64) -> Result<Task, EngineError> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("task {}", task_id)))
    }

    /// Validate and persist a new campaign with its tasks
    pub async fn create(
        &self,
        request: CreateQuickDeploymentRequest,
        operator: Operator,
    ) -> Result<CampaignDetail, EngineError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(EngineError::ValidationError("title is required".to_string()));
        }
        if request.applications.is_empty() {
            return Err(EngineError::ValidationError(
                "at least one application is required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tasks = Vec::with_capacity(request.applications.len());
        for (index, target) in request.applications.iter().enumerate() {
            let environment = target.environment.trim();
            if environment.is_empty() {
                return Err(EngineError::ValidationError(format!(
                    "application {} has no environment",
                    target.app_id
                )));
            }
            if self.is_protected(environment) {
                return Err(EngineError::ValidationError(format!(
                    "environment {} cannot be quick deployed",
                    environment
                )));
            }
            let app = self
                .catalog
                .get_application(target.app_id)
                .await?
                .ok_or_else(|| {
                    EngineError::ValidationError(format!(
                        "application {} does not exist",
                        target.app_id
                    ))
                })?;

            tasks.push(Task {
                id: 0,
                deployment_id: 0,
                app_id: app.id,
                app_name: app.name,
                app_code: app.code,
                environment: environment.to_string(),
                env_config_id: None,
                server_id: None,
                job_name: None,
                job_url: None,
                build_number: None,
                status: TaskStatus::NotDeployed,
                execute_order: index as u32 + 1,
                start_time: None,
                end_time: None,
                duration: None,
                error_message: None,
                log_url: None,
                created_at: now,
                updated_at: now,
            });
        }

        let campaign = Campaign {
            id: 0,
            title: title.to_string(),
            description: request.description,
            business_group_id: request.business_group_id,
            business_dept_id: request.business_dept_id,
            creator_id: operator.id,
            creator_name: operator.name,
            execution_mode: ExecutionMode::default(),
            task_count: tasks.len() as u32,
            status: CampaignStatus::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            created_at: now,
            updated_at: now,
        };

        let (campaign, tasks) = self.store.insert(campaign, tasks).await?;
        info!(
            "Created deployment {} \"{}\" with {} tasks",
            campaign.id, campaign.title, campaign.task_count
        );
        Ok(CampaignDetail { campaign, tasks })
    }

    /// Start a pending campaign; returns once it is marked running
    pub async fn execute(
        &self,
        id: u64,
        mode: Option<ExecutionMode>,
    ) -> Result<Campaign, EngineError> {
        // Held until the live entry is registered
        let mut live = self.live.lock().await;

        let mut campaign = self.require_campaign(id).await?;
        let mut fsm = CampaignFsm::resume(campaign.status);
        if fsm.process(CampaignEvent::Execute).is_err() {
            return Err(EngineError::ValidationError(format!(
                "deployment {} is {} and cannot be executed",
                id,
                campaign.status.text()
            )));
        }

        let mode = mode.unwrap_or_default();
        let now = Utc::now();
        campaign.status = fsm.state();
        campaign.execution_mode = mode;
        campaign.start_time = Some(now);
        campaign.updated_at = now;
        self.store.update_campaign(&campaign).await?;

        let tasks = self.store.tasks_for(id).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let cancel_requested = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor::new(
            self.store.clone(),
            campaign.clone(),
            tasks.clone(),
            rx,
            cancel.clone(),
            cancel_requested.clone(),
            self.options.campaign_timeout,
        );
        let live_map = self.live.clone();
        tokio::spawn(async move {
            let finished = supervisor.run().await;
            live_map.lock().await.remove(&finished.id);
            let _ = done_tx.send(true);
        });
        tokio::spawn(dispatch(
            self.task_runner.clone(),
            tasks,
            mode,
            tx,
            cancel.clone(),
        ));

        live.insert(
            id,
            LiveCampaign {
                cancel,
                cancel_requested,
                done: done_rx,
            },
        );
        info!("Executing deployment {} in {:?} mode", id, mode);
        Ok(campaign)
    }

    /// Ask every worker of a running campaign to stop
    pub async fn cancel(&self, id: u64) -> Result<Campaign, EngineError> {
        let campaign = self.require_campaign(id).await?;
        if campaign.status != CampaignStatus::Running {
            return Err(EngineError::ValidationError(format!(
                "deployment {} is {} and cannot be cancelled",
                id,
                campaign.status.text()
            )));
        }

        let signalled = {
            let live = self.live.lock().await;
            match live.get(&id) {
                Some(entry) => {
                    entry.cancel_requested.store(true, Ordering::SeqCst);
                    entry.cancel.cancel();
                    true
                }
                None => false,
            }
        };

        if signalled {
            info!("Cancel requested for deployment {}", id);
            Ok(campaign)
        } else {
            self.close_orphan(campaign).await
        }
    }

    /// Settle a campaign marked running that has no live supervisor
    async fn close_orphan(&self, mut campaign: Campaign) -> Result<Campaign, EngineError> {
        warn!("Deployment {} has no live supervisor, closing it", campaign.id);
        self.stop_open_builds(campaign.id).await?;

        let now = Utc::now();
        for mut task in self.store.tasks_for(campaign.id).await? {
            if task.status.is_terminal() {
                continue;
            }
            task.status = TaskStatus::Failed;
            task.error_message = Some(CANCELLED.to_string());
            task.end_time = Some(now);
            task.duration = task.start_time.map(|start| elapsed_ms(start, now));
            task.updated_at = now;
            self.store.update_task(&task).await?;
        }

        campaign.status = CampaignStatus::Cancelled;
        campaign.end_time = Some(now);
        campaign.duration = campaign.start_time.map(|start| elapsed_ms(start, now));
        campaign.updated_at = now;
        self.store.update_campaign(&campaign).await?;
        Ok(campaign)
    }

    /// Best-effort stop of builds still attached to non-terminal tasks
    async fn stop_open_builds(&self, id: u64) -> Result<(), EngineError> {
        for task in self.store.tasks_for(id).await? {
            if task.status.is_terminal() {
                continue;
            }
            let (Some(server_id), Some(job), Some(number)) =
                (task.server_id, task.job_name.as_deref(), task.build_number)
            else {
                continue;
            };
            match self.runner.stop_build(server_id, job, number).await {
                Ok(()) => info!("Stopped {} #{} of task {}", job, number, task.id),
                Err(RunnerError::AlreadyTerminal(_)) => {}
                Err(e) => warn!("Failed to stop {} #{} of task {}: {}", job, number, task.id, e),
            }
        }
        Ok(())
    }

    async fn wind_down(&self, id: u64, entry: (CancellationToken, watch::Receiver<bool>)) {
        let (cancel, mut done) = entry;
        cancel.cancel();
        let settled = tokio::time::timeout(self.options.stop_wait, done.wait_for(|done| *done))
            .await
            .is_ok();
        if !settled {
            warn!(
                "Deployment {} did not settle within {:?}",
                id, self.options.stop_wait
            );
        }
    }

    /// Delete a campaign and its tasks; unknown ids are ignored
    pub async fn delete(&self, id: u64) -> Result<(), EngineError> {
        let Some(campaign) = self.store.get_campaign(id).await? else {
            debug!("Deployment {} already deleted", id);
            return Ok(());
        };

        if campaign.status == CampaignStatus::Running {
            let entry = {
                let live = self.live.lock().await;
                live.get(&id).map(|entry| {
                    entry.cancel_requested.store(true, Ordering::SeqCst);
                    (entry.cancel.clone(), entry.done.clone())
                })
            };
            if let Some(entry) = entry {
                info!("Cancelling running deployment {} before delete", id);
                self.wind_down(id, entry).await;
            }
            self.stop_open_builds(id).await?;
        }

        self.store.delete_campaign(id).await?;
        info!("Deleted deployment {}", id);
        Ok(())
    }

    pub async fn get_campaign(&self, id: u64) -> Result<CampaignDetail, EngineError> {
        let campaign = self.require_campaign(id).await?;
        let tasks = self.store.tasks_for(id).await?;
        Ok(CampaignDetail { campaign, tasks })
    }

    pub async fn list(&self, query: ListQuery) -> Result<PageResult<Campaign>, EngineError> {
        let status = match query.status {
            Some(code) => Some(CampaignStatus::from_code(code).ok_or_else(|| {
                EngineError::ValidationError(format!("invalid status {}", code))
            })?),
            None => None,
        };
        let filter = CampaignFilter {
            business_group_id: query.business_group_id,
            business_dept_id: query.business_dept_id,
            environment: query.environment.filter(|env| !env.is_empty()),
            status,
            creator_id: query.creator_id,
        };

        let page = query.page.unwrap_or(1).max(1);
        let page_size = query
            .page_size
            .unwrap_or(self.options.default_page_size)
            .clamp(1, self.options.max_page_size);
        let (total, list) = self.store.list_campaigns(&filter, page, page_size).await?;

        Ok(PageResult {
            total,
            list,
            page,
            page_size,
        })
    }

    pub async fn task_status(&self, task_id: u64) -> Result<TaskStatusResponse, EngineError> {
        let task = self.require_task(task_id).await?;
        Ok(TaskStatusResponse {
            task_id: task.id,
            status: task.status.code(),
            status_text: task.status.text().to_string(),
            build_number: task.build_number,
            start_time: task.start_time,
            end_time: task.end_time,
            duration: task.duration,
            progress: task.progress(Utc::now()),
            error_message: task.error_message,
            log_url: task.log_url,
        })
    }

    pub async fn campaign_status(&self, id: u64) -> Result<CampaignStatusResponse, EngineError> {
        let campaign = self.require_campaign(id).await?;
        let tasks = self.store.tasks_for(id).await?;

        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count() as u32;
        let succeeded = count(TaskStatus::Succeeded);
        let failed = count(TaskStatus::Failed);
        let terminal = succeeded + failed;
        let progress = if tasks.is_empty() {
            0
        } else {
            (terminal as usize * 100 / tasks.len()) as u8
        };

        Ok(CampaignStatusResponse {
            deployment_id: campaign.id,
            status: campaign.status.code(),
            status_text: campaign.status.text().to_string(),
            task_count: campaign.task_count,
            terminal_count: terminal,
            succeeded_count: succeeded,
            failed_count: failed,
            progress,
            start_time: campaign.start_time,
            end_time: campaign.end_time,
            duration: campaign.duration,
        })
    }

    /// Console output of a task's build from byte offset `start`
    pub async fn task_log(
        &self,
        task_id: u64,
        start: u64,
        html: bool,
    ) -> Result<TaskLogResponse, EngineError> {
        let task = self.require_task(task_id).await?;
        let (Some(server_id), Some(job), Some(number)) =
            (task.server_id, task.job_name.as_deref(), task.build_number)
        else {
            return Err(EngineError::NotAvailable(format!(
                "task {} has no build yet",
                task_id
            )));
        };

        let chunk = self
            .runner
            .get_build_log(server_id, job, number, start, html)
            .await?;
        Ok(TaskLogResponse {
            task_id,
            build_number: number,
            text: chunk.text,
            next_start: chunk.next_start,
            has_more: chunk.has_more,
        })
    }

    /// Which applications could be quick deployed to an environment
    pub async fn deployable_applications(
        &self,
        query: DeployableQuery,
    ) -> Result<Vec<DeployableApplication>, EngineError> {
        let environment = query.environment.trim();
        if environment.is_empty() {
            return Err(EngineError::ValidationError("environment is required".to_string()));
        }
        let protected = self.is_protected(environment);

        let apps = self
            .catalog
            .list_applications(query.business_group_id, query.business_dept_id)
            .await?;

        Ok(apps
            .into_iter()
            .map(|app| {
                let reason = if protected {
                    Some(format!("environment {} cannot be quick deployed", environment))
                } else {
                    select_config(&app, environment)
                        .and_then(|config| self.resolver.bind(config))
                        .err()
                        .map(|e| e.to_string())
                };
                DeployableApplication {
                    app_id: app.id,
                    app_name: app.name,
                    app_code: app.code,
                    environment: environment.to_string(),
                    can_deploy: reason.is_none(),
                    reason,
                }
            })
            .collect())
    }

    /// Cancel every running campaign and wait for them to settle
    ///
    /// Campaigns wind down together, so the whole call is bounded by one `stop_wait`.
    pub async fn shutdown(&self) {
        let entries: Vec<(u64, (CancellationToken, watch::Receiver<bool>))> = {
            let live = self.live.lock().await;
            live.iter()
                .map(|(id, entry)| (*id, (entry.cancel.clone(), entry.done.clone())))
                .collect()
        };

        if !entries.is_empty() {
            info!("Stopping {} running deployments...", entries.len());
        }
        join_all(
            entries
                .into_iter()
                .map(|(id, entry)| self.wind_down(id, entry)),
        )
        .await;
    }
}
