//! File operations

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tokio::fs;

use crate::errors::EngineError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, EngineError> {
        fs::read_to_string(&self.path).await.map_err(|e| {
            EngineError::ConfigError(format!("cannot read {}: {}", self.path.display(), e))
        })
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        let contents = self.read_string().await?;
        serde_json::from_str(&contents).map_err(|e| {
            EngineError::ConfigError(format!("invalid JSON in {}: {}", self.path.display(), e))
        })
    }
}
