//! Server state

use std::sync::Arc;

use deploy_api::BuildServerInfo;

use crate::deploy::orchestrator::Orchestrator;
use crate::http::pool::BuildRunner;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub runner: Arc<dyn BuildRunner>,
    pub servers: Vec<BuildServerInfo>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, servers: Vec<BuildServerInfo>) -> Self {
        let runner = orchestrator.runner();
        Self {
            orchestrator,
            runner,
            servers,
        }
    }
}
