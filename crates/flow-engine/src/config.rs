//! Engine configuration
//!
//! Configuration files are plain JSON. A missing file yields defaults and
//! every field falls back to its default when omitted.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

use crate::constants::defaults;

/// Tunables for a workflow controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Snapshots kept for undo/redo
    pub history_limit: usize,
    /// Let reactive nodes recompute and forward updates past the first hop
    pub transitive_propagation: bool,
    /// Capacity of the command channel
    pub command_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: defaults::HISTORY_LIMIT,
            transitive_propagation: false,
            command_buffer: defaults::COMMAND_BUFFER,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path).await
    }

    /// Save configuration to a JSON file
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(self, path).await
    }
}

/// Read a JSON config file, falling back to defaults when it does not exist
pub async fn load_json<T>(path: &Path) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    if !fs::try_exists(path).await.map_err(ConfigError::Io)? {
        log::debug!("No config at {:?}, using defaults", path);
        return Ok(T::default());
    }

    let contents = fs::read_to_string(path).await.map_err(ConfigError::Io)?;

    serde_json::from_str(&contents).map_err(ConfigError::Parse)
}

/// Write a value as pretty-printed JSON, creating parent directories
pub async fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(ConfigError::Io)?;
    }

    let contents = serde_json::to_string_pretty(value).map_err(ConfigError::Serialize)?;

    fs::write(path, contents).await.map_err(ConfigError::Io)?;

    log::info!("Configuration saved to {:?}", path);
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(serde_json::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(serde_json::Error),
}
