//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::logs::LogLevel;
use crate::utils::CooldownOptions;

/// Engine settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rotated log files under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Application catalog file, relative to the settings directory
    #[serde(default = "default_catalog_file")]
    pub catalog_file: String,

    /// Jenkins controllers tasks can be bound to
    #[serde(default)]
    pub build_servers: Vec<BuildServerSettings>,

    /// Build polling configuration
    #[serde(default)]
    pub runner: RunnerSettings,

    /// Environments quick deployments may not target
    #[serde(default = "default_protected_environments")]
    pub protected_environments: Vec<String>,

    /// Optional ceiling for a whole campaign
    #[serde(default)]
    pub campaign_timeout_secs: Option<u64>,

    /// Maximum delay for graceful shutdown
    #[serde(default = "default_shutdown_delay")]
    pub max_shutdown_delay_secs: u64,
}

fn default_catalog_file() -> String {
    "catalog.json".to_string()
}

fn default_protected_environments() -> Vec<String> {
    vec!["prod".to_string()]
}

fn default_shutdown_delay() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            catalog_file: default_catalog_file(),
            build_servers: Vec::new(),
            runner: RunnerSettings::default(),
            protected_environments: default_protected_environments(),
            campaign_timeout_secs: None,
            max_shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Jenkins controller settings
#[derive(Debug, Deserialize)]
pub struct BuildServerSettings {
    pub id: u64,

    #[serde(default)]
    pub alias: String,

    pub url: String,

    pub username: String,

    /// API token used as the basic-auth password
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_token: SecretString,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let token = String::deserialize(deserializer)?;
    Ok(SecretString::from(token))
}

/// Build polling settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSettings {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_queue_poll_interval")]
    pub queue_poll_interval_secs: u64,

    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_secs: u64,

    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Consecutive transient failures tolerated per wait
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// In-flight requests allowed per build server
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// First delay after a transient failure, doubled on each retry
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound of the retry delay
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,
}

impl RunnerSettings {
    /// Retry backoff for transient build server failures
    pub fn backoff(&self) -> CooldownOptions {
        let base_delay = Duration::from_millis(self.backoff_base_ms);
        CooldownOptions {
            base_delay,
            max_delay: Duration::from_millis(self.backoff_max_ms).max(base_delay),
            ..Default::default()
        }
    }
}

fn default_poll_interval() -> u64 {
    3
}

fn default_queue_poll_interval() -> u64 {
    2
}

fn default_queue_timeout() -> u64 {
    600
}

fn default_build_timeout() -> u64 {
    1800
}

fn default_max_retries() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_concurrent_requests() -> usize {
    4
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    30_000
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            queue_poll_interval_secs: default_queue_poll_interval(),
            queue_timeout_secs: default_queue_timeout(),
            build_timeout_secs: default_build_timeout(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent_requests(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
        }
    }
}
