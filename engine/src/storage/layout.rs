//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// Where the engine looks for its files
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the application catalog file path
    pub fn catalog_file(&self) -> File {
        File::new(self.base_dir.join("catalog.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Resolve a configured path relative to the base directory
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/rollout")
    }
}
