//! Drives one deployment task through a Jenkins build

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jenkins_models::{BuildDetail, BuildResult, QueuedBuild};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::RunnerError;
use crate::http::pool::BuildRunner;
use crate::models::deployment::{Task, TaskStatus};
use crate::resolver::{BuildBinding, JobResolver};
use crate::utils::{calc_exp_backoff, console_url, CooldownOptions};

pub const CANCELLED: &str = "cancelled";
pub const CANCELLED_BEFORE_START: &str = "cancelled before start";
pub const BUILD_NOT_ASSIGNED: &str = "build not assigned";
pub const BUILD_TIMED_OUT: &str = "build timed out";
pub const SKIPPED: &str = "skipped: predecessor failed";

/// Task runner options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between queue item polls
    pub queue_poll_interval: Duration,

    /// How long a queued build may wait for an executor
    pub queue_timeout: Duration,

    /// Delay between build status polls
    pub poll_interval: Duration,

    /// How long a build may run
    pub build_timeout: Duration,

    /// Consecutive transient failures tolerated per wait
    pub max_retries: u32,

    /// Backoff applied after transient failures
    pub backoff: CooldownOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            queue_poll_interval: Duration::from_secs(2),
            queue_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(3),
            build_timeout: Duration::from_secs(1800),
            max_retries: 5,
            backoff: CooldownOptions::default(),
        }
    }
}

/// Terminal result of a task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub log_url: Option<String>,
    pub ended_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn succeeded(log_url: Option<String>) -> Self {
        Self {
            status: TaskStatus::Succeeded,
            error_message: None,
            log_url,
            ended_at: Utc::now(),
        }
    }

    pub fn failed(error: impl Into<String>, log_url: Option<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            error_message: Some(error.into()),
            log_url,
            ended_at: Utc::now(),
        }
    }
}

/// Progress reported by a task worker to its campaign supervisor
#[derive(Debug, Clone)]
pub enum TaskUpdate {
    Deploying {
        binding: BuildBinding,
        started_at: DateTime<Utc>,
    },
    BuildAssigned {
        build_number: u64,
    },
    Finished(TaskOutcome),
}

#[derive(Debug, Clone)]
pub struct TaskMessage {
    pub task_id: u64,
    pub update: TaskUpdate,
}

/// Sending half used by one task worker
///
/// `finish` consumes the reporter, so a task reports its outcome once.
pub struct TaskReporter {
    task_id: u64,
    tx: mpsc::UnboundedSender<TaskMessage>,
}

impl TaskReporter {
    pub fn new(task_id: u64, tx: mpsc::UnboundedSender<TaskMessage>) -> Self {
        Self { task_id, tx }
    }

    fn send(&self, update: TaskUpdate) {
        let message = TaskMessage {
            task_id: self.task_id,
            update,
        };
        if self.tx.send(message).is_err() {
            debug!("Supervisor gone, dropping update for task {}", self.task_id);
        }
    }

    pub fn deploying(&self, binding: BuildBinding, started_at: DateTime<Utc>) {
        self.send(TaskUpdate::Deploying {
            binding,
            started_at,
        });
    }

    pub fn build_assigned(&self, build_number: u64) {
        self.send(TaskUpdate::BuildAssigned { build_number });
    }

    pub fn finish(self, outcome: TaskOutcome) -> TaskStatus {
        let status = outcome.status;
        self.send(TaskUpdate::Finished(outcome));
        status
    }
}

enum Interrupt {
    Cancelled,
    Failed(String),
}

enum QueueState {
    Waiting,
    Assigned(u64),
    Cancelled,
}

/// Runs tasks against the build runner
pub struct TaskRunner {
    runner: Arc<dyn BuildRunner>,
    resolver: Arc<JobResolver>,
    options: Options,
}

impl TaskRunner {
    pub fn new(runner: Arc<dyn BuildRunner>, resolver: Arc<JobResolver>, options: Options) -> Self {
        Self {
            runner,
            resolver,
            options,
        }
    }

    /// Run a task to a terminal state and report it
    pub async fn run(
        &self,
        task: &Task,
        reporter: TaskReporter,
        cancel: &CancellationToken,
    ) -> TaskStatus {
        let binding = match self.resolver.resolve(task.app_id, &task.environment).await {
            Ok(binding) => binding,
            Err(e) => {
                warn!(
                    "Task {} ({} / {}) cannot be deployed: {}",
                    task.id, task.app_name, task.environment, e
                );
                return reporter.finish(TaskOutcome::failed(e.to_string(), None));
            }
        };
        if cancel.is_cancelled() {
            return reporter.finish(TaskOutcome::failed(CANCELLED_BEFORE_START, None));
        }

        info!(
            "Task {}: deploying {} to {} with job {} on server {}",
            task.id, task.app_name, task.environment, binding.job_name, binding.server_id
        );
        reporter.deploying(binding.clone(), Utc::now());

        let queued = match self.trigger(&binding, cancel).await {
            Ok(queued) => queued,
            Err(Interrupt::Cancelled) => {
                return reporter.finish(TaskOutcome::failed(CANCELLED_BEFORE_START, None))
            }
            Err(Interrupt::Failed(error)) => {
                warn!("Task {}: {}", task.id, error);
                return reporter.finish(TaskOutcome::failed(error, None));
            }
        };

        let number = match self.await_build_number(&binding, queued.queue_id, cancel).await {
            Ok(number) => number,
            Err(Interrupt::Cancelled) => {
                return reporter.finish(TaskOutcome::failed(CANCELLED_BEFORE_START, None))
            }
            Err(Interrupt::Failed(error)) => {
                warn!("Task {}: {}", task.id, error);
                return reporter.finish(TaskOutcome::failed(error, None));
            }
        };
        info!("Task {}: {} is build #{}", task.id, binding.job_name, number);
        reporter.build_assigned(number);

        let fallback_log = console_url(&build_url(&binding.job_url, number));
        match self.await_completion(&binding, number, cancel).await {
            Ok(build) => {
                let log_url = if build.url.is_empty() {
                    fallback_log
                } else {
                    console_url(&build.url)
                };
                match build.outcome() {
                    BuildResult::Success => {
                        info!("Task {}: build #{} succeeded", task.id, number);
                        reporter.finish(TaskOutcome::succeeded(Some(log_url)))
                    }
                    result => {
                        warn!("Task {}: build #{} ended {}", task.id, number, result.as_str());
                        reporter.finish(TaskOutcome::failed(result.as_str(), Some(log_url)))
                    }
                }
            }
            Err(Interrupt::Cancelled) => {
                info!("Task {}: cancelled, stopping build #{}", task.id, number);
                self.stop_quietly(&binding, number).await;
                reporter.finish(TaskOutcome::failed(CANCELLED, Some(fallback_log)))
            }
            Err(Interrupt::Failed(error)) => {
                warn!("Task {}: {}", task.id, error);
                reporter.finish(TaskOutcome::failed(error, Some(fallback_log)))
            }
        }
    }

    /// Queue the build; retried only when the request never reached Jenkins
    async fn trigger(
        &self,
        binding: &BuildBinding,
        cancel: &CancellationToken,
    ) -> Result<QueuedBuild, Interrupt> {
        let params = HashMap::new();
        let mut attempt = 0;
        loop {
            match self
                .runner
                .start_job(binding.server_id, &binding.job_name, &params)
                .await
            {
                Ok(queued) => return Ok(queued),
                Err(RunnerError::Connection(e)) if attempt < self.options.max_retries => {
                    warn!("Cannot reach server {} to start {}: {}", binding.server_id, binding.job_name, e);
                    self.pause(calc_exp_backoff(&self.options.backoff, attempt), cancel)
                        .await?;
                    attempt += 1;
                }
                Err(e) => return Err(Interrupt::Failed(format!("failed to start build: {}", e))),
            }
        }
    }

    async fn await_build_number(
        &self,
        binding: &BuildBinding,
        queue_id: u64,
        cancel: &CancellationToken,
    ) -> Result<u64, Interrupt> {
        let deadline = Instant::now() + self.options.queue_timeout;
        let mut failures = 0;
        loop {
            match self.poll_queue(binding, queue_id).await {
                Ok(QueueState::Assigned(number)) => return Ok(number),
                Ok(QueueState::Cancelled) => {
                    return Err(Interrupt::Failed(format!(
                        "queue item {} was cancelled",
                        queue_id
                    )))
                }
                Ok(QueueState::Waiting) => failures = 0,
                Err(e) if e.is_transient() && failures < self.options.max_retries => {
                    failures += 1;
                    warn!("Queue item {} poll failed ({}): {}", queue_id, failures, e);
                }
                Err(e) => {
                    return Err(Interrupt::Failed(format!(
                        "waiting for queue item {} failed: {}",
                        queue_id, e
                    )))
                }
            }

            if Instant::now() >= deadline {
                warn!("Queue item {} not assigned within {:?}", queue_id, self.options.queue_timeout);
                self.abandon_queued(binding, queue_id).await;
                return Err(Interrupt::Failed(BUILD_NOT_ASSIGNED.to_string()));
            }
            let wait = self.next_wait(self.options.queue_poll_interval, failures);
            if let Err(interrupt) = self.pause(wait, cancel).await {
                self.abandon_queued(binding, queue_id).await;
                return Err(interrupt);
            }
        }
    }

    /// Withdraw a queued build; stops it if an executor took it meanwhile
    async fn abandon_queued(&self, binding: &BuildBinding, queue_id: u64) {
        match self
            .runner
            .cancel_queue_item(binding.server_id, queue_id)
            .await
        {
            Ok(()) => info!("Withdrew queue item {} of {}", queue_id, binding.job_name),
            Err(RunnerError::NotFound(_)) => {
                debug!("Queue item {} already left the queue", queue_id)
            }
            Err(e) => warn!("Failed to withdraw queue item {}: {}", queue_id, e),
        }

        if let Ok(QueueState::Assigned(number)) = self.poll_queue(binding, queue_id).await {
            self.stop_quietly(binding, number).await;
        }
    }

    async fn poll_queue(&self, binding: &BuildBinding, queue_id: u64) -> Result<QueueState, RunnerError> {
        match self.runner.get_queue_item(binding.server_id, queue_id).await {
            Ok(item) if item.cancelled => Ok(QueueState::Cancelled),
            Ok(item) => Ok(match item.executable {
                Some(executable) => QueueState::Assigned(executable.number),
                None => QueueState::Waiting,
            }),
            // Jenkins forgets queue items shortly after they start
            Err(RunnerError::NotFound(_)) => {
                let builds = self
                    .runner
                    .list_builds(binding.server_id, &binding.job_name)
                    .await?;
                Ok(builds
                    .iter()
                    .find(|build| build.queue_id == Some(queue_id))
                    .map_or(QueueState::Waiting, |build| QueueState::Assigned(build.number)))
            }
            Err(e) => Err(e),
        }
    }

    async fn await_completion(
        &self,
        binding: &BuildBinding,
        number: u64,
        cancel: &CancellationToken,
    ) -> Result<BuildDetail, Interrupt> {
        let deadline = Instant::now() + self.options.build_timeout;
        let mut failures = 0;
        loop {
            match self
                .runner
                .get_build(binding.server_id, &binding.job_name, number)
                .await
            {
                Ok(build) if !build.building => return Ok(build),
                Ok(_) => failures = 0,
                Err(e) if e.is_transient() && failures < self.options.max_retries => {
                    failures += 1;
                    warn!("Build #{} poll failed ({}): {}", number, failures, e);
                }
                Err(e) => {
                    return Err(Interrupt::Failed(format!(
                        "polling build #{} failed: {}",
                        number, e
                    )))
                }
            }

            if Instant::now() >= deadline {
                warn!("Build #{} of {} exceeded {:?}", number, binding.job_name, self.options.build_timeout);
                self.stop_quietly(binding, number).await;
                return Err(Interrupt::Failed(BUILD_TIMED_OUT.to_string()));
            }
            self.pause(self.next_wait(self.options.poll_interval, failures), cancel)
                .await?;
        }
    }

    async fn stop_quietly(&self, binding: &BuildBinding, number: u64) {
        match self
            .runner
            .stop_build(binding.server_id, &binding.job_name, number)
            .await
        {
            Ok(()) => info!("Stopped {} #{}", binding.job_name, number),
            Err(RunnerError::AlreadyTerminal(_)) => {
                debug!("{} #{} already finished", binding.job_name, number)
            }
            Err(e) => warn!("Failed to stop {} #{}: {}", binding.job_name, number, e),
        }
    }

    fn next_wait(&self, interval: Duration, failures: u32) -> Duration {
        if failures == 0 {
            interval
        } else {
            calc_exp_backoff(&self.options.backoff, failures - 1)
        }
    }

    async fn pause(&self, wait: Duration, cancel: &CancellationToken) -> Result<(), Interrupt> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

fn build_url(job_url: &str, number: u64) -> String {
    format!("{}/{}/", job_url.trim_end_matches('/'), number)
}
