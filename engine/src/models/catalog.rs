//! Application catalog records

use serde::{Deserialize, Serialize};

/// A deployable application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub business_group_id: u64,
    #[serde(default)]
    pub business_dept_id: u64,
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
}

/// Per-environment build configuration of an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub id: u64,
    pub environment: String,
    #[serde(default)]
    pub server_id: Option<u64>,
    #[serde(default)]
    pub job_name: String,
}

/// On-disk catalog file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub applications: Vec<Application>,
}
