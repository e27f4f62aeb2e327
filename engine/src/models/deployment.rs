//! Campaign and task records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Estimated run time of one deployment, used for progress hints
const ESTIMATED_TASK_SECS: i64 = 300;

/// Campaign status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CampaignStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl CampaignStatus {
    pub fn code(&self) -> u8 {
        match self {
            CampaignStatus::Pending => 1,
            CampaignStatus::Running => 2,
            CampaignStatus::Succeeded => 3,
            CampaignStatus::Failed => 4,
            CampaignStatus::Cancelled => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CampaignStatus::Pending),
            2 => Some(CampaignStatus::Running),
            3 => Some(CampaignStatus::Succeeded),
            4 => Some(CampaignStatus::Failed),
            5 => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            CampaignStatus::Pending => "pending",
            CampaignStatus::Running => "running",
            CampaignStatus::Succeeded => "succeeded",
            CampaignStatus::Failed => "failed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Succeeded | CampaignStatus::Failed | CampaignStatus::Cancelled
        )
    }
}

/// Task status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    NotDeployed,
    Deploying,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn code(&self) -> u8 {
        match self {
            TaskStatus::NotDeployed => 1,
            TaskStatus::Deploying => 2,
            TaskStatus::Succeeded => 3,
            TaskStatus::Failed => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(TaskStatus::NotDeployed),
            2 => Some(TaskStatus::Deploying),
            3 => Some(TaskStatus::Succeeded),
            4 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            TaskStatus::NotDeployed => "not deployed",
            TaskStatus::Deploying => "deploying",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// How the tasks of a campaign are dispatched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Parallel,
    Serial,
}

impl ExecutionMode {
    pub fn code(&self) -> u8 {
        match self {
            ExecutionMode::Parallel => 1,
            ExecutionMode::Serial => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ExecutionMode::Parallel),
            2 => Some(ExecutionMode::Serial),
            _ => None,
        }
    }
}

macro_rules! numeric_serde {
    ($ty:ident, $name:literal) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_u8(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let code = u8::deserialize(deserializer)?;
                $ty::from_code(code).ok_or_else(|| {
                    serde::de::Error::custom(format!("Invalid {}: {}", $name, code))
                })
            }
        }
    };
}

numeric_serde!(CampaignStatus, "campaign status");
numeric_serde!(TaskStatus, "task status");
numeric_serde!(ExecutionMode, "execution mode");

/// Identity of whoever submitted a campaign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub id: u64,
    pub name: String,
}

impl Default for Operator {
    fn default() -> Self {
        Self {
            id: 0,
            name: "anonymous".to_string(),
        }
    }
}

/// A quick deployment campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub business_group_id: u64,
    pub business_dept_id: u64,
    pub creator_id: u64,
    pub creator_name: String,
    pub execution_mode: ExecutionMode,
    pub task_count: u32,
    pub status: CampaignStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start and end
    pub duration: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A campaign together with its ordered tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignDetail {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub tasks: Vec<Task>,
}

/// One application deployment inside a campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub deployment_id: u64,
    pub app_id: u64,
    pub app_name: String,
    pub app_code: String,
    pub environment: String,
    pub env_config_id: Option<u64>,
    pub server_id: Option<u64>,
    pub job_name: Option<String>,
    pub job_url: Option<String>,
    pub build_number: Option<u64>,
    pub status: TaskStatus,
    pub execute_order: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start and end
    pub duration: Option<i64>,
    pub error_message: Option<String>,
    pub log_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Rough completion percentage
    ///
    /// Deploying tasks scale from 10 to 90 over the estimated run time.
    pub fn progress(&self, now: DateTime<Utc>) -> u8 {
        match self.status {
            TaskStatus::NotDeployed => 0,
            TaskStatus::Succeeded | TaskStatus::Failed => 100,
            TaskStatus::Deploying => {
                let elapsed = self
                    .start_time
                    .map(|start| (now - start).num_seconds().max(0))
                    .unwrap_or(0);
                let scaled = 10 + elapsed * 80 / ESTIMATED_TASK_SECS;
                scaled.min(90) as u8
            }
        }
    }
}

/// Milliseconds between two instants, never negative
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_milliseconds().max(0)
}
