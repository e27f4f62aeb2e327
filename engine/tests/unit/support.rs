//! Shared test doubles

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jenkins_models::{
    BuildDetail, BuildSummary, Executable, Job, JobDetail, LogChunk, Queue, QueueItem,
    QueuedBuild, SystemInfo,
};
use rollout::deploy::orchestrator::{self, Orchestrator};
use rollout::errors::RunnerError;
use rollout::http::pool::BuildRunner;
use rollout::models::catalog::{Application, EnvironmentConfig};
use rollout::models::deployment::{Campaign, CampaignDetail};
use rollout::storage::catalog::MemoryCatalog;
use rollout::storage::deployments::MemoryStore;
use rollout::utils::CooldownOptions;
use rollout::workers::task_runner;

pub const SERVER_ID: u64 = 1;

/// How a scripted job behaves once started
#[derive(Debug, Clone)]
pub enum Script {
    /// Finish with `result` after `polls` in-progress polls
    Finish { polls: u32, result: &'static str },

    /// Keep building until stopped
    Hang,

    /// Refuse to start
    Reject,
}

/// How a job's queue item behaves once queued
#[derive(Debug, Clone, Copy)]
pub enum QueueScript {
    /// Waits for `polls` queue polls, then gets an executor
    Wait(u32),

    /// Starts at once and drops out of the queue; only the build list knows it
    Forgotten,

    /// Jenkins cancels the item
    Cancelled,

    /// Never gets an executor
    Stuck,
}

struct FakeBuild {
    job: String,
    number: u64,
    queue_id: u64,
    polls: u32,
    stopped: bool,
}

struct FakeQueued {
    job: String,
    number: u64,
    polls: u32,
    withdrawn: bool,
}

#[derive(Default)]
struct FakeState {
    next_queue_id: u64,
    next_numbers: HashMap<String, u64>,
    queue: HashMap<u64, FakeQueued>,
    builds: Vec<FakeBuild>,
    stopped: Vec<(String, u64)>,
    withdrawn: Vec<u64>,
    transient_left: HashMap<String, u32>,
}

impl FakeState {
    fn assign(&mut self, queue_id: u64) -> Option<u64> {
        let queued = self.queue.get(&queue_id)?;
        let (job, number) = (queued.job.clone(), queued.number);
        if !self.builds.iter().any(|build| build.queue_id == queue_id) {
            self.builds.push(FakeBuild {
                job,
                number,
                queue_id,
                polls: 0,
                stopped: false,
            });
        }
        Some(number)
    }

    /// Consume one scripted transient failure of `job`
    fn transient(&mut self, job: &str) -> Result<(), RunnerError> {
        match self.transient_left.get_mut(job) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(RunnerError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// In-memory build runner with scripted jobs and call counters
pub struct FakeRunner {
    servers: Vec<u64>,
    scripts: HashMap<String, Script>,
    queue_scripts: HashMap<String, QueueScript>,
    stop_delay: Option<Duration>,
    state: Mutex<FakeState>,
    calls: AtomicUsize,
    starts: AtomicUsize,
}

impl FakeRunner {
    pub fn new(scripts: Vec<(&str, Script)>) -> Self {
        Self {
            servers: vec![SERVER_ID],
            scripts: scripts
                .into_iter()
                .map(|(job, script)| (job.to_string(), script))
                .collect(),
            queue_scripts: HashMap::new(),
            stop_delay: None,
            state: Mutex::new(FakeState::default()),
            calls: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
        }
    }

    /// Script the queue item of `job`; unscripted jobs start at once
    pub fn with_queue(mut self, job: &str, script: QueueScript) -> Self {
        self.queue_scripts.insert(job.to_string(), script);
        self
    }

    /// Fail the next `count` build polls of `job` with a 503
    pub fn with_transient_failures(self, job: &str, count: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .transient_left
            .insert(job.to_string(), count);
        self
    }

    /// Make every stop request take `delay`
    pub fn with_stop_delay(mut self, delay: Duration) -> Self {
        self.stop_delay = Some(delay);
        self
    }

    /// Every async runner call, i.e. every request that would hit Jenkins
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().stopped.clone()
    }

    /// Queue items withdrawn through `cancel_queue_item`
    pub fn withdrawn(&self) -> Vec<u64> {
        self.state.lock().unwrap().withdrawn.clone()
    }

    fn touch(&self, server_id: u64) -> Result<(), RunnerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.servers.contains(&server_id) {
            Ok(())
        } else {
            Err(RunnerError::UnknownServer(server_id))
        }
    }

    fn script(&self, job: &str) -> Result<Script, RunnerError> {
        self.scripts
            .get(job)
            .cloned()
            .ok_or_else(|| RunnerError::NotFound(format!("job {}", job)))
    }

    fn detail(&self, build: &FakeBuild) -> Result<BuildDetail, RunnerError> {
        let (building, result) = if build.stopped {
            (false, Some("ABORTED".to_string()))
        } else {
            match self.script(&build.job)? {
                Script::Finish { polls, result } if build.polls > polls => {
                    (false, Some(result.to_string()))
                }
                _ => (true, None),
            }
        };
        Ok(BuildDetail {
            number: build.number,
            url: format!("http://jenkins.test/job/{}/{}/", build.job, build.number),
            result,
            building,
            ..Default::default()
        })
    }
}

#[async_trait]
impl BuildRunner for FakeRunner {
    fn has_server(&self, server_id: u64) -> bool {
        self.servers.contains(&server_id)
    }

    fn job_url(&self, server_id: u64, job: &str) -> Result<String, RunnerError> {
        if !self.has_server(server_id) {
            return Err(RunnerError::UnknownServer(server_id));
        }
        Ok(format!("http://jenkins.test/job/{}/", job))
    }

    async fn list_jobs(&self, server_id: u64) -> Result<Vec<Job>, RunnerError> {
        self.touch(server_id)?;
        let mut jobs: Vec<Job> = self
            .scripts
            .keys()
            .map(|name| Job {
                name: name.clone(),
                url: format!("http://jenkins.test/job/{}/", name),
                ..Default::default()
            })
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn search_jobs(&self, server_id: u64, keyword: &str) -> Result<Vec<Job>, RunnerError> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Err(RunnerError::InvalidInput("keyword is empty".to_string()));
        }
        let jobs = self.list_jobs(server_id).await?;
        Ok(jobs.into_iter().filter(|job| job.matches(&needle)).collect())
    }

    async fn get_job(&self, server_id: u64, job: &str) -> Result<JobDetail, RunnerError> {
        self.touch(server_id)?;
        self.script(job)?;
        Ok(JobDetail {
            name: job.to_string(),
            ..Default::default()
        })
    }

    async fn start_job(
        &self,
        server_id: u64,
        job: &str,
        _params: &HashMap<String, String>,
    ) -> Result<QueuedBuild, RunnerError> {
        self.touch(server_id)?;
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Script::Reject = self.script(job)? {
            return Err(RunnerError::Http {
                status: 400,
                body: "rejected".to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        state.next_queue_id += 1;
        let queue_id = state.next_queue_id;
        let number = state.next_numbers.entry(job.to_string()).or_insert(0);
        *number += 1;
        let number = *number;
        state.queue.insert(
            queue_id,
            FakeQueued {
                job: job.to_string(),
                number,
                polls: 0,
                withdrawn: false,
            },
        );
        if matches!(
            self.queue_scripts.get(job),
            None | Some(QueueScript::Forgotten)
        ) {
            state.assign(queue_id);
        }
        Ok(QueuedBuild {
            queued: true,
            queue_id,
        })
    }

    async fn get_queue_item(&self, server_id: u64, queue_id: u64) -> Result<QueueItem, RunnerError> {
        self.touch(server_id)?;
        let mut state = self.state.lock().unwrap();
        let not_found = || RunnerError::NotFound(format!("queue item {}", queue_id));
        let queued = state.queue.get_mut(&queue_id).ok_or_else(not_found)?;
        queued.polls += 1;
        let (polls, withdrawn) = (queued.polls, queued.withdrawn);

        let waiting = QueueItem {
            id: queue_id,
            ..Default::default()
        };
        let script = self.queue_scripts.get(&queued.job).copied();
        if withdrawn || matches!(script, Some(QueueScript::Cancelled)) {
            return Ok(QueueItem {
                cancelled: true,
                ..waiting
            });
        }
        let number = match script {
            Some(QueueScript::Forgotten) => return Err(not_found()),
            Some(QueueScript::Stuck) => return Ok(waiting),
            Some(QueueScript::Wait(wait)) if polls <= wait => return Ok(waiting),
            _ => state.assign(queue_id).ok_or_else(not_found)?,
        };
        Ok(QueueItem {
            executable: Some(Executable {
                number,
                url: String::new(),
            }),
            ..waiting
        })
    }

    async fn cancel_queue_item(&self, server_id: u64, queue_id: u64) -> Result<(), RunnerError> {
        self.touch(server_id)?;
        let mut state = self.state.lock().unwrap();
        let queued = state
            .queue
            .get_mut(&queue_id)
            .ok_or_else(|| RunnerError::NotFound(format!("queue item {}", queue_id)))?;
        queued.withdrawn = true;
        state.withdrawn.push(queue_id);
        Ok(())
    }

    async fn list_builds(&self, server_id: u64, job: &str) -> Result<Vec<BuildSummary>, RunnerError> {
        self.touch(server_id)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .builds
            .iter()
            .filter(|build| build.job == job)
            .map(|build| BuildSummary {
                number: build.number,
                queue_id: Some(build.queue_id),
                ..Default::default()
            })
            .collect())
    }

    async fn stop_build(&self, server_id: u64, job: &str, number: u64) -> Result<(), RunnerError> {
        self.touch(server_id)?;
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        let build = state
            .builds
            .iter_mut()
            .find(|build| build.job == job && build.number == number)
            .ok_or_else(|| RunnerError::NotFound(format!("{} #{}", job, number)))?;
        if build.stopped {
            return Err(RunnerError::AlreadyTerminal(format!("{} #{}", job, number)));
        }
        build.stopped = true;
        state.stopped.push((job.to_string(), number));
        Ok(())
    }

    async fn get_build(&self, server_id: u64, job: &str, number: u64) -> Result<BuildDetail, RunnerError> {
        self.touch(server_id)?;
        let mut state = self.state.lock().unwrap();
        state.transient(job)?;
        let build = state
            .builds
            .iter_mut()
            .find(|build| build.job == job && build.number == number)
            .ok_or_else(|| RunnerError::NotFound(format!("{} #{}", job, number)))?;
        build.polls += 1;
        self.detail(build)
    }

    async fn get_build_log(
        &self,
        server_id: u64,
        job: &str,
        number: u64,
        start: u64,
        _html: bool,
    ) -> Result<LogChunk, RunnerError> {
        self.touch(server_id)?;
        let text = format!("Started {} #{}\nFinished\n", job, number);
        let start = (start as usize).min(text.len());
        Ok(LogChunk {
            text: text[start..].to_string(),
            next_start: text.len() as u64,
            has_more: false,
        })
    }

    async fn get_system_info(&self, server_id: u64) -> Result<SystemInfo, RunnerError> {
        self.touch(server_id)?;
        Ok(SystemInfo::default())
    }

    async fn get_queue_info(&self, server_id: u64) -> Result<Queue, RunnerError> {
        self.touch(server_id)?;
        Ok(Queue::default())
    }
}

pub fn config(id: u64, environment: &str, server_id: Option<u64>, job: &str) -> EnvironmentConfig {
    EnvironmentConfig {
        id,
        environment: environment.to_string(),
        server_id,
        job_name: job.to_string(),
    }
}

pub fn app(id: u64, code: &str, environments: Vec<EnvironmentConfig>) -> Application {
    Application {
        id,
        name: format!("{} service", code),
        code: code.to_string(),
        business_group_id: 10,
        business_dept_id: 20,
        environments,
    }
}

/// Apps 1..=3 deploy to "test" with jobs `<code>-test`; app 4 has no test job
pub fn catalog() -> Vec<Application> {
    vec![
        app(1, "web", vec![config(11, "test", Some(SERVER_ID), "web-test")]),
        app(2, "api", vec![config(21, "test", Some(SERVER_ID), "api-test")]),
        app(3, "worker", vec![config(31, "test", Some(SERVER_ID), "worker-test")]),
        app(4, "legacy", vec![config(41, "uat", Some(SERVER_ID), "legacy-uat")]),
    ]
}

pub fn fast_runner_options() -> task_runner::Options {
    task_runner::Options {
        queue_poll_interval: Duration::from_millis(5),
        queue_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        build_timeout: Duration::from_secs(5),
        max_retries: 2,
        backoff: CooldownOptions {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        },
    }
}

pub fn orchestrator(runner: Arc<FakeRunner>) -> Orchestrator {
    orchestrator_with(runner, orchestrator::Options {
        stop_wait: Duration::from_secs(2),
        ..Default::default()
    })
}

pub fn orchestrator_with(runner: Arc<FakeRunner>, options: orchestrator::Options) -> Orchestrator {
    orchestrator_full(runner, options, fast_runner_options())
}

pub fn orchestrator_full(
    runner: Arc<FakeRunner>,
    options: orchestrator::Options,
    runner_options: task_runner::Options,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCatalog::new(catalog()).unwrap()),
        runner,
        options,
        runner_options,
    )
}

/// Poll until the campaign leaves the running state
pub async fn wait_settled(orchestrator: &Orchestrator, id: u64) -> CampaignDetail {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let detail = orchestrator.get_campaign(id).await.unwrap();
            if is_settled(&detail.campaign) {
                return detail;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("campaign did not settle")
}

fn is_settled(campaign: &Campaign) -> bool {
    campaign.end_time.is_some()
}
