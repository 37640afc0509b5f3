//! Configuration for the persistence layer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which store backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Volatile, process-local maps
    Memory,
    /// JSON files under `data_dir`
    Local,
}

/// Configuration for the persistence layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Backend selection
    pub backend: BackendKind,

    /// Base directory for persistence files
    pub data_dir: PathBuf,

    /// Whether to fsync each record write
    pub fsync_every_write: bool,

    /// Pretty-print JSON records (handy when inspecting by hand)
    pub pretty_json: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            data_dir: PathBuf::from("./data"),
            fsync_every_write: false,
            pretty_json: true,
        }
    }
}

impl PersistenceConfig {
    /// Create a new configuration with custom data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Default::default() }
    }

    /// Get the wallets directory path
    pub fn wallets_dir(&self) -> PathBuf {
        self.data_dir.join("wallets")
    }

    /// Get the pool record path
    pub fn pool_path(&self) -> PathBuf {
        self.data_dir.join("pool.json")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == BackendKind::Local && self.data_dir.as_os_str().is_empty() {
            return Err("data_dir must be set for the local backend".to_string());
        }

        Ok(())
    }
}
