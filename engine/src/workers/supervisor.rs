//! Per-campaign supervisor
//!
//! Owns the task and campaign records of one running campaign. Task workers
//! report through a channel and the supervisor applies their updates in
//! arrival order, then settles the campaign once every task is terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deploy::fsm::{CampaignEvent, CampaignFsm, TaskEvent, TaskFsm};
use crate::models::deployment::{elapsed_ms, Campaign, Task, TaskStatus};
use crate::storage::deployments::DeploymentStore;
use crate::workers::task_runner::{TaskMessage, TaskUpdate};

pub const WORKER_LOST: &str = "worker exited without reporting";

pub struct Supervisor {
    store: Arc<dyn DeploymentStore>,
    campaign: Campaign,
    tasks: Vec<Task>,
    rx: mpsc::UnboundedReceiver<TaskMessage>,
    cancel: CancellationToken,
    cancel_requested: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        campaign: Campaign,
        tasks: Vec<Task>,
        rx: mpsc::UnboundedReceiver<TaskMessage>,
        cancel: CancellationToken,
        cancel_requested: Arc<AtomicBool>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            campaign,
            tasks,
            rx,
            cancel,
            cancel_requested,
            timeout,
        }
    }

    /// Apply updates until every task is terminal, then settle the campaign
    pub async fn run(mut self) -> Campaign {
        info!(
            "Supervising deployment {} ({} tasks, {:?})",
            self.campaign.id,
            self.tasks.len(),
            self.campaign.execution_mode
        );

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let mut timed_out = false;

        while !self.all_terminal() {
            tokio::select! {
                message = self.rx.recv() => match message {
                    Some(message) => self.apply(message).await,
                    None => self.fail_open_tasks(WORKER_LOST).await,
                },
                _ = wait_until(deadline), if !timed_out => {
                    timed_out = true;
                    warn!("Deployment {} exceeded its time limit, cancelling", self.campaign.id);
                    self.cancel.cancel();
                }
            }
        }

        self.finalize().await;
        self.campaign
    }

    fn all_terminal(&self) -> bool {
        self.tasks.iter().all(|task| task.status.is_terminal())
    }

    async fn apply(&mut self, message: TaskMessage) {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == message.task_id) else {
            warn!(
                "Deployment {} received an update for unknown task {}",
                self.campaign.id, message.task_id
            );
            return;
        };

        let mut fsm = TaskFsm::resume(task.status);
        match message.update {
            TaskUpdate::Deploying {
                binding,
                started_at,
            } => {
                if let Err(e) = fsm.process(TaskEvent::Start) {
                    warn!("Ignoring start of task {}: {}", task.id, e);
                    return;
                }
                task.env_config_id = Some(binding.env_config_id);
                task.server_id = Some(binding.server_id);
                task.job_name = Some(binding.job_name);
                task.job_url = Some(binding.job_url);
                task.start_time = Some(started_at);
            }
            TaskUpdate::BuildAssigned { build_number } => {
                if task.status != TaskStatus::Deploying || task.build_number.is_some() {
                    warn!(
                        "Ignoring build #{} for task {} in state {:?}",
                        build_number, task.id, task.status
                    );
                    return;
                }
                task.build_number = Some(build_number);
            }
            TaskUpdate::Finished(outcome) => {
                let event = match outcome.status {
                    TaskStatus::Succeeded => TaskEvent::Succeed,
                    _ => TaskEvent::Fail(outcome.error_message.clone().unwrap_or_default()),
                };
                if let Err(e) = fsm.process(event) {
                    warn!("Ignoring late outcome of task {}: {}", task.id, e);
                    return;
                }
                task.end_time = Some(outcome.ended_at);
                task.duration = task
                    .start_time
                    .map(|start| elapsed_ms(start, outcome.ended_at));
                task.error_message = outcome.error_message;
                if outcome.log_url.is_some() {
                    task.log_url = outcome.log_url;
                }
            }
        }

        task.status = fsm.state();
        task.updated_at = Utc::now();
        debug!("Task {} is now {:?}", task.id, task.status);

        if let Err(e) = self.store.update_task(task).await {
            warn!("Failed to persist task {}: {}", task.id, e);
        }
    }

    async fn fail_open_tasks(&mut self, reason: &str) {
        let now = Utc::now();
        for task in self.tasks.iter_mut().filter(|task| !task.status.is_terminal()) {
            warn!("Task {} of deployment {}: {}", task.id, self.campaign.id, reason);
            task.status = TaskStatus::Failed;
            task.error_message = Some(reason.to_string());
            task.end_time = Some(now);
            task.duration = task.start_time.map(|start| elapsed_ms(start, now));
            task.updated_at = now;
            if let Err(e) = self.store.update_task(task).await {
                warn!("Failed to persist task {}: {}", task.id, e);
            }
        }
    }

    /// Settle the campaign status; end time and duration are written once
    async fn finalize(&mut self) {
        let event = if self.cancel_requested.load(Ordering::SeqCst) {
            CampaignEvent::Cancelled
        } else {
            CampaignEvent::Complete {
                all_succeeded: self
                    .tasks
                    .iter()
                    .all(|task| task.status == TaskStatus::Succeeded),
            }
        };

        let mut fsm = CampaignFsm::resume(self.campaign.status);
        if let Err(e) = fsm.process(event) {
            warn!("Not settling deployment {}: {}", self.campaign.id, e);
            return;
        }

        let now = Utc::now();
        self.campaign.status = fsm.state();
        self.campaign.end_time = Some(now);
        self.campaign.duration = self.campaign.start_time.map(|start| elapsed_ms(start, now));
        self.campaign.updated_at = now;

        if let Err(e) = self.store.update_campaign(&self.campaign).await {
            warn!("Failed to persist deployment {}: {}", self.campaign.id, e);
        }
        info!(
            "Deployment {} finished {} after {:?} ms",
            self.campaign.id,
            self.campaign.status.text(),
            self.campaign.duration
        );
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
