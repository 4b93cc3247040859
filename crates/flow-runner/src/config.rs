//! Runner configuration
//!
//! One JSON file carries both the engine tunables and the generation
//! client settings:
//!
//! ```json
//! {
//!   "engine": { "history_limit": 50, "transitive_propagation": true },
//!   "generation": { "base_url": "https://gen.example", "max_retries": 3 }
//! }
//! ```

use std::path::{Path, PathBuf};

use flow_engine::config::{load_json, ConfigError};
use flow_engine::{EngineConfig, WorkflowSnapshot};
use flow_nodes::GenerationConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub engine: EngineConfig,
    pub generation: GenerationConfig,
}

impl RunnerConfig {
    /// Load from `path`, or use defaults when no path is given
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => load_json(path).await,
            None => Ok(Self::default()),
        }
    }

    /// Apply command-line overrides on top of the file values
    pub fn with_overrides(
        mut self,
        base_url: Option<String>,
        api_token: Option<String>,
        transitive: bool,
    ) -> Self {
        if let Some(base_url) = base_url {
            self.generation.base_url = base_url;
        }
        if api_token.is_some() {
            self.generation.api_token = api_token;
        }
        if transitive {
            self.engine.transitive_propagation = true;
        }
        self
    }
}

#[derive(Debug, Error)]
pub enum WorkflowFileError {
    #[error("Failed to read workflow {path:?}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Invalid workflow {path:?}: {error}")]
    Parse {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
}

/// Read a `{ nodes, edges }` workflow file
///
/// Unlike configuration, a missing workflow is an error.
pub async fn load_workflow(path: &Path) -> Result<WorkflowSnapshot, WorkflowFileError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| WorkflowFileError::Read {
            path: path.to_path_buf(),
            error,
        })?;
    serde_json::from_str(&contents).map_err(|error| WorkflowFileError::Parse {
        path: path.to_path_buf(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_engine::NodeType;

    #[tokio::test]
    async fn test_load_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runner.json");
        tokio::fs::write(
            &path,
            r#"{"engine": {"history_limit": 5}, "generation": {"base_url": "https://gen.example"}}"#,
        )
        .await
        .unwrap();

        let config = RunnerConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.engine.history_limit, 5);
        assert!(!config.engine.transitive_propagation);
        assert_eq!(config.generation.base_url, "https://gen.example");
        assert_eq!(config.generation.max_retries, GenerationConfig::default().max_retries);
    }

    #[tokio::test]
    async fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::load(Some(&dir.path().join("absent.json")))
            .await
            .unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(RunnerConfig::load(None).await.unwrap(), RunnerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = RunnerConfig::default().with_overrides(
            Some("http://10.0.0.2:9000".into()),
            Some("token".into()),
            true,
        );
        assert_eq!(config.generation.base_url, "http://10.0.0.2:9000");
        assert_eq!(config.generation.api_token.as_deref(), Some("token"));
        assert!(config.engine.transitive_propagation);

        let untouched = RunnerConfig::default().with_overrides(None, None, false);
        assert_eq!(untouched, RunnerConfig::default());
    }

    #[tokio::test]
    async fn test_load_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflow.json");
        tokio::fs::write(
            &path,
            r#"{
                "nodes": [
                    {"id": "p1", "data": {"settings": {"type": "prompt", "text": "a fox"}}},
                    {"id": "t1", "data": {"settings": {"type": "textOutput"}}}
                ],
                "edges": [
                    {"id": "e1", "source": "p1", "sourceHandle": "prompt", "target": "t1", "targetHandle": "text"}
                ]
            }"#,
        )
        .await
        .unwrap();

        let snapshot = load_workflow(&path).await.unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.nodes[0].data.settings.node_type(), NodeType::Prompt);
        assert_eq!(snapshot.edges[0].target_port(), "text");

        let err = load_workflow(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, WorkflowFileError::Read { .. }));
    }
}
