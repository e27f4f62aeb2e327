//! Application catalog

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::info;

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::models::catalog::{Application, CatalogFile};

/// Read access to applications and their environment configurations
#[async_trait]
pub trait ApplicationCatalog: Send + Sync {
    async fn get_application(&self, app_id: u64) -> Result<Option<Application>, EngineError>;

    /// Applications of a business group and department; `None` matches all
    async fn list_applications(
        &self,
        business_group_id: Option<u64>,
        business_dept_id: Option<u64>,
    ) -> Result<Vec<Application>, EngineError>;
}

/// Catalog held in memory, typically loaded from `catalog.json`
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    applications: BTreeMap<u64, Application>,
}

impl MemoryCatalog {
    pub fn new(applications: Vec<Application>) -> Result<Self, EngineError> {
        let mut by_id = BTreeMap::new();
        for app in applications {
            let id = app.id;
            if by_id.insert(id, app).is_some() {
                return Err(EngineError::ConfigError(format!(
                    "duplicate application id {} in catalog",
                    id
                )));
            }
        }
        Ok(Self { applications: by_id })
    }

    pub async fn load(file: &File) -> Result<Self, EngineError> {
        let catalog: CatalogFile = file.read_json().await?;
        info!(
            "Loaded {} applications from {}",
            catalog.applications.len(),
            file.path().display()
        );
        Self::new(catalog.applications)
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }
}

#[async_trait]
impl ApplicationCatalog for MemoryCatalog {
    async fn get_application(&self, app_id: u64) -> Result<Option<Application>, EngineError> {
        Ok(self.applications.get(&app_id).cloned())
    }

    async fn list_applications(
        &self,
        business_group_id: Option<u64>,
        business_dept_id: Option<u64>,
    ) -> Result<Vec<Application>, EngineError> {
        Ok(self
            .applications
            .values()
            .filter(|app| business_group_id.map_or(true, |id| app.business_group_id == id))
            .filter(|app| business_dept_id.map_or(true, |id| app.business_dept_id == id))
            .cloned()
            .collect())
    }
}
