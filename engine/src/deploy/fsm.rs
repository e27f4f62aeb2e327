//! Forward-only state machines for tasks and campaigns

use crate::models::deployment::{CampaignStatus, TaskStatus};

/// Task event
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Build binding resolved, build about to be triggered
    Start,

    /// Build finished with SUCCESS
    Succeed,

    /// Task failed, before or after its build started
    Fail(String),
}

/// Task FSM
#[derive(Debug, Clone)]
pub struct TaskFsm {
    state: TaskStatus,
    error: Option<String>,
}

impl TaskFsm {
    /// Create a new FSM in the not-deployed state
    pub fn new() -> Self {
        Self::resume(TaskStatus::NotDeployed)
    }

    /// Continue from a persisted state
    pub fn resume(state: TaskStatus) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> TaskStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: TaskEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (TaskStatus::NotDeployed, TaskEvent::Start) => TaskStatus::Deploying,
            (TaskStatus::Deploying, TaskEvent::Succeed) => TaskStatus::Succeeded,

            // Unresolvable, skipped or cancelled tasks fail without deploying
            (TaskStatus::NotDeployed | TaskStatus::Deploying, TaskEvent::Fail(err)) => {
                self.error = Some(err.clone());
                TaskStatus::Failed
            }

            (state, event) => {
                return Err(format!("Invalid task transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for TaskFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Campaign event
#[derive(Debug, Clone)]
pub enum CampaignEvent {
    Execute,

    /// Every task reached a terminal state
    Complete { all_succeeded: bool },

    /// Every task reached a terminal state after a cancel request
    Cancelled,
}

/// Campaign FSM
#[derive(Debug, Clone)]
pub struct CampaignFsm {
    state: CampaignStatus,
}

impl CampaignFsm {
    pub fn new() -> Self {
        Self::resume(CampaignStatus::Pending)
    }

    pub fn resume(state: CampaignStatus) -> Self {
        Self { state }
    }

    pub fn state(&self) -> CampaignStatus {
        self.state
    }

    pub fn process(&mut self, event: CampaignEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (CampaignStatus::Pending, CampaignEvent::Execute) => CampaignStatus::Running,
            (CampaignStatus::Running, CampaignEvent::Complete { all_succeeded: true }) => {
                CampaignStatus::Succeeded
            }
            (CampaignStatus::Running, CampaignEvent::Complete { all_succeeded: false }) => {
                CampaignStatus::Failed
            }
            (CampaignStatus::Running, CampaignEvent::Cancelled) => CampaignStatus::Cancelled,
            (state, event) => {
                return Err(format!(
                    "Invalid campaign transition: {:?} -> {:?}",
                    state, event
                ));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for CampaignFsm {
    fn default() -> Self {
        Self::new()
    }
}
