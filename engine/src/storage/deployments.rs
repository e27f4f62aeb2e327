//! Campaign and task persistence

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::EngineError;
use crate::models::deployment::{Campaign, CampaignStatus, Task};

/// Campaign list filter; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub business_group_id: Option<u64>,
    pub business_dept_id: Option<u64>,
    /// Matches campaigns with at least one task in this environment
    pub environment: Option<String>,
    pub status: Option<CampaignStatus>,
    pub creator_id: Option<u64>,
}

/// Storage of campaign and task records
///
/// Ids are assigned by the store on insert.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Insert a campaign and its tasks in one atomic write
    async fn insert(
        &self,
        campaign: Campaign,
        tasks: Vec<Task>,
    ) -> Result<(Campaign, Vec<Task>), EngineError>;

    async fn get_campaign(&self, id: u64) -> Result<Option<Campaign>, EngineError>;

    /// Page through campaigns, newest first; returns the total match count
    async fn list_campaigns(
        &self,
        filter: &CampaignFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(u64, Vec<Campaign>), EngineError>;

    /// Tasks of a campaign ordered by execution order
    async fn tasks_for(&self, campaign_id: u64) -> Result<Vec<Task>, EngineError>;

    async fn get_task(&self, task_id: u64) -> Result<Option<Task>, EngineError>;

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), EngineError>;

    async fn update_task(&self, task: &Task) -> Result<(), EngineError>;

    /// Delete a campaign and all its tasks; false if it did not exist
    async fn delete_campaign(&self, id: u64) -> Result<bool, EngineError>;
}

#[derive(Default)]
struct Tables {
    campaigns: BTreeMap<u64, Campaign>,
    tasks: BTreeMap<u64, Task>,
}

/// In-memory store
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_campaign_id: AtomicU64,
    next_task_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_campaign_id: AtomicU64::new(1),
            next_task_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(filter: &CampaignFilter, campaign: &Campaign, tables: &Tables) -> bool {
    if filter.business_group_id.is_some_and(|id| campaign.business_group_id != id) {
        return false;
    }
    if filter.business_dept_id.is_some_and(|id| campaign.business_dept_id != id) {
        return false;
    }
    if filter.status.is_some_and(|status| campaign.status != status) {
        return false;
    }
    if filter.creator_id.is_some_and(|id| campaign.creator_id != id) {
        return false;
    }
    match &filter.environment {
        Some(env) => tables
            .tasks
            .values()
            .any(|task| task.deployment_id == campaign.id && &task.environment == env),
        None => true,
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn insert(
        &self,
        mut campaign: Campaign,
        mut tasks: Vec<Task>,
    ) -> Result<(Campaign, Vec<Task>), EngineError> {
        let mut tables = self.tables.write().await;

        campaign.id = self.next_campaign_id.fetch_add(1, Ordering::SeqCst);
        for task in tasks.iter_mut() {
            task.id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
            task.deployment_id = campaign.id;
            tables.tasks.insert(task.id, task.clone());
        }
        tables.campaigns.insert(campaign.id, campaign.clone());

        Ok((campaign, tasks))
    }

    async fn get_campaign(&self, id: u64) -> Result<Option<Campaign>, EngineError> {
        Ok(self.tables.read().await.campaigns.get(&id).cloned())
    }

    async fn list_campaigns(
        &self,
        filter: &CampaignFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(u64, Vec<Campaign>), EngineError> {
        let tables = self.tables.read().await;
        let matched: Vec<&Campaign> = tables
            .campaigns
            .values()
            .rev()
            .filter(|campaign| matches(filter, campaign, &tables))
            .collect();

        let total = matched.len() as u64;
        let skip = (page.max(1) as usize - 1) * page_size as usize;
        let list = matched
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect();

        Ok((total, list))
    }

    async fn tasks_for(&self, campaign_id: u64) -> Result<Vec<Task>, EngineError> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|task| task.deployment_id == campaign_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.execute_order);
        Ok(tasks)
    }

    async fn get_task(&self, task_id: u64) -> Result<Option<Task>, EngineError> {
        Ok(self.tables.read().await.tasks.get(&task_id).cloned())
    }

    async fn update_campaign(&self, campaign: &Campaign) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&campaign.id) {
            Some(row) => {
                *row = campaign.clone();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("deployment {}", campaign.id))),
        }
    }

    async fn update_task(&self, task: &Task) -> Result<(), EngineError> {
        let mut tables = self.tables.write().await;
        match tables.tasks.get_mut(&task.id) {
            Some(row) => {
                *row = task.clone();
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("task {}", task.id))),
        }
    }

    async fn delete_campaign(&self, id: u64) -> Result<bool, EngineError> {
        let mut tables = self.tables.write().await;
        let existed = tables.campaigns.remove(&id).is_some();
        tables.tasks.retain(|_, task| task.deployment_id != id);
        Ok(existed)
    }
}
