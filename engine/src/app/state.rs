//! Application state management

use std::sync::Arc;

use deploy_api::BuildServerInfo;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::http::pool::{JenkinsPool, ServerEntry};
use crate::storage::catalog::MemoryCatalog;
use crate::storage::deployments::MemoryStore;

/// Main application state
pub struct AppState {
    /// Campaign lifecycle owner
    pub orchestrator: Arc<Orchestrator>,

    /// Configured build servers, without credentials
    pub servers: Vec<BuildServerInfo>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions, servers: Vec<ServerEntry>) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        let catalog_file = File::new(options.layout.resolve(&options.catalog_file));
        let catalog = MemoryCatalog::load(&catalog_file).await?;
        if catalog.is_empty() {
            warn!("Catalog {} has no applications", catalog_file.path().display());
        } else {
            info!("Loaded {} applications from the catalog", catalog.len());
        }

        if servers.is_empty() {
            warn!("No build servers configured");
        }
        let pool = JenkinsPool::new(servers, &options.pool)?;
        let servers = pool.servers();

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(catalog),
            Arc::new(pool),
            options.orchestrator.clone(),
            options.task_runner.clone(),
        ));

        Ok(Self {
            orchestrator,
            servers,
        })
    }

    /// Stop running campaigns
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Shutting down application state...");
        self.orchestrator.shutdown().await;
        Ok(())
    }
}
