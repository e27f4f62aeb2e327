//! Application configuration options

use std::time::Duration;

use crate::deploy::orchestrator;
use crate::http::pool;
use crate::storage::layout::StorageLayout;
use crate::workers::task_runner;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Catalog file, relative paths resolve against the layout
    pub catalog_file: String,

    /// Server configuration
    pub server: ServerOptions,

    /// Build server connection options
    pub pool: pool::Options,

    /// Per-task polling and retry options
    pub task_runner: task_runner::Options,

    /// Campaign orchestration options
    pub orchestrator: orchestrator::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            catalog_file: "catalog.json".to_string(),
            server: ServerOptions::default(),
            pool: pool::Options::default(),
            task_runner: task_runner::Options::default(),
            orchestrator: orchestrator::Options::default(),
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
