//! Error types for the release engine

use thiserror::Error;

/// Main error type for the release engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Build runner error: {0}")]
    RunnerError(#[from] RunnerError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Envelope code, also used as the HTTP status
    pub fn code(&self) -> u16 {
        match self {
            EngineError::ValidationError(_) | EngineError::JsonError(_) => 400,
            EngineError::NotFound(_) => 404,
            EngineError::NotAvailable(_) => 409,
            EngineError::RunnerError(e) => e.code(),
            _ => 500,
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// Failures talking to a build server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("build already finished: {0}")]
    AlreadyTerminal(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown build server: {0}")]
    UnknownServer(u64),

    #[error("unexpected response: {0}")]
    Protocol(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl RunnerError {
    /// Network failures and 5xx replies may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            RunnerError::Connection(_) | RunnerError::Timeout(_) => true,
            RunnerError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            RunnerError::InvalidInput(_) => 400,
            RunnerError::NotFound(_) | RunnerError::UnknownServer(_) => 404,
            RunnerError::AlreadyTerminal(_) => 409,
            _ => 502,
        }
    }
}

impl From<reqwest::Error> for RunnerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RunnerError::Timeout(err.to_string())
        } else if err.is_connect() {
            RunnerError::Connection(err.to_string())
        } else {
            RunnerError::Protocol(err.to_string())
        }
    }
}
