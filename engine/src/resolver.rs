//! Maps an application and environment to a Jenkins job

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::http::pool::BuildRunner;
use crate::models::catalog::{Application, EnvironmentConfig};
use crate::storage::catalog::ApplicationCatalog;

/// Where a task's build runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildBinding {
    pub env_config_id: u64,
    pub server_id: u64,
    pub job_name: String,
    pub job_url: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("ambiguous configuration: {0}")]
    AmbiguousConfig(String),
}

/// Pick the single configuration of `app` for `environment`
///
/// Environment names are compared case-sensitively.
pub fn select_config<'a>(
    app: &'a Application,
    environment: &str,
) -> Result<&'a EnvironmentConfig, ResolveError> {
    let mut matches = app
        .environments
        .iter()
        .filter(|config| config.environment == environment);

    let config = matches.next().ok_or_else(|| {
        ResolveError::NotConfigured(format!(
            "application {} has no configuration for environment {}",
            app.name, environment
        ))
    })?;
    if matches.next().is_some() {
        return Err(ResolveError::AmbiguousConfig(format!(
            "application {} has several configurations for environment {}",
            app.name, environment
        )));
    }

    let server_id = config.server_id.unwrap_or(0);
    if server_id == 0 {
        return Err(ResolveError::NotConfigured(format!(
            "application {} has no build server for environment {}",
            app.name, environment
        )));
    }
    if config.job_name.trim().is_empty() {
        return Err(ResolveError::NotConfigured(format!(
            "application {} has no job name for environment {}",
            app.name, environment
        )));
    }

    Ok(config)
}

/// Resolves build bindings without contacting the build server
pub struct JobResolver {
    catalog: Arc<dyn ApplicationCatalog>,
    runner: Arc<dyn BuildRunner>,
}

impl JobResolver {
    pub fn new(catalog: Arc<dyn ApplicationCatalog>, runner: Arc<dyn BuildRunner>) -> Self {
        Self { catalog, runner }
    }

    pub async fn resolve(&self, app_id: u64, environment: &str) -> Result<BuildBinding, ResolveError> {
        let app = self
            .catalog
            .get_application(app_id)
            .await
            .map_err(|e| ResolveError::NotConfigured(format!("catalog lookup failed: {}", e)))?
            .ok_or_else(|| ResolveError::NotConfigured(format!("application {} not found", app_id)))?;

        let config = select_config(&app, environment)?;
        self.bind(config)
    }

    /// Check that the configured server is registered and build the binding
    pub fn bind(&self, config: &EnvironmentConfig) -> Result<BuildBinding, ResolveError> {
        let server_id = config.server_id.unwrap_or(0);
        if !self.runner.has_server(server_id) {
            return Err(ResolveError::NotConfigured(format!(
                "build server {} is not registered",
                server_id
            )));
        }

        let job_name = config.job_name.trim().to_string();
        let job_url = self
            .runner
            .job_url(server_id, &job_name)
            .map_err(|e| ResolveError::NotConfigured(e.to_string()))?;

        debug!("Resolved {} on server {} to {}", config.environment, server_id, job_url);
        Ok(BuildBinding {
            env_config_id: config.id,
            server_id,
            job_name,
            job_url,
        })
    }
}
