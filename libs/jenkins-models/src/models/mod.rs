//! Jenkins models

use serde::{Deserialize, Serialize};

/// Job entry as returned by `/api/json?tree=jobs[...]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub buildable: Option<bool>,
}

impl Job {
    /// Case-insensitive match over name, display name and description.
    ///
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        let hit = |value: &str| value.to_lowercase().contains(needle);
        hit(&self.name)
            || self.display_name.as_deref().is_some_and(hit)
            || self.description.as_deref().is_some_and(hit)
    }
}

/// Root job listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobList {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// Build reference embedded in a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRef {
    pub number: u64,
    #[serde(default)]
    pub url: String,
}

/// Job detail with last build summaries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub buildable: Option<bool>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub in_queue: bool,
    #[serde(default)]
    pub next_build_number: Option<u64>,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
    #[serde(default)]
    pub last_stable_build: Option<BuildRef>,
    #[serde(default)]
    pub last_successful_build: Option<BuildRef>,
    #[serde(default)]
    pub last_failed_build: Option<BuildRef>,
    #[serde(default)]
    pub last_completed_build: Option<BuildRef>,
    #[serde(default)]
    pub builds: Vec<BuildRef>,
}

/// Build summary from a job's build list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub number: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub keep_log: bool,
    #[serde(default)]
    pub queue_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildList {
    #[serde(default)]
    pub builds: Vec<BuildSummary>,
}

/// Full build detail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildDetail {
    pub number: u64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub full_display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub estimated_duration: i64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub queue_id: Option<u64>,
    #[serde(default)]
    pub keep_log: bool,
}

impl BuildDetail {
    pub fn outcome(&self) -> BuildResult {
        if self.building {
            return BuildResult::InProgress;
        }
        BuildResult::parse(self.result.as_deref())
    }
}

/// Terminal result of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    NotBuilt,
    InProgress,
}

impl BuildResult {
    pub fn parse(result: Option<&str>) -> Self {
        match result {
            Some("SUCCESS") => BuildResult::Success,
            Some("FAILURE") => BuildResult::Failure,
            Some("UNSTABLE") => BuildResult::Unstable,
            Some("ABORTED") => BuildResult::Aborted,
            Some("NOT_BUILT") => BuildResult::NotBuilt,
            // Running builds report a null result
            _ => BuildResult::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Failure => "FAILURE",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Aborted => "ABORTED",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::InProgress => "IN_PROGRESS",
        }
    }
}

/// Build started from a queue item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Executable {
    pub number: u64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueTask {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// Queue item from `/queue/item/{id}/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: u64,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub buildable: bool,
    #[serde(default)]
    pub stuck: bool,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub in_queue_since: i64,
    #[serde(default)]
    pub task: Option<QueueTask>,
    #[serde(default)]
    pub executable: Option<Executable>,
}

/// Build queue from `/queue/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Queue {
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

/// Controller information from the root `/api/json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub node_description: Option<String>,
    #[serde(default)]
    pub num_executors: u32,
    #[serde(default)]
    pub quieting_down: bool,
    #[serde(default)]
    pub use_security: bool,
    /// Taken from the `X-Jenkins` response header
    #[serde(default)]
    pub version: Option<String>,
}

/// CSRF crumb from `/crumbIssuer/api/json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Crumb {
    pub crumb: String,
    pub crumb_request_field: String,
}

/// Result of triggering a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedBuild {
    pub queued: bool,
    pub queue_id: u64,
}

/// One slice of a progressive console log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub text: String,
    pub next_start: u64,
    pub has_more: bool,
}
