//! Connection validation
//!
//! Decides whether a proposed edge may enter the graph. Rules run in a fixed
//! order and the first failure wins:
//!
//! 1. both endpoint nodes exist
//! 2. both node types have a configuration
//! 3. both handles resolve to connectors
//! 4. the connector types are compatible
//! 5. the target connector has room for another edge
//! 6. no mutual-exclusion group on the target is violated
//!
//! Validation never mutates anything, so it can be called speculatively
//! (for example while the user is dragging a connection).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::NodeRegistry;
use crate::types::{ConnectorType, Edge, HandleId, NodeId, NodeType, WorkflowGraph, DEFAULT_HANDLE};

/// Reason a connection was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("cannot connect a node to itself")]
    SelfConnection,

    #[error("configuration not found for {0}")]
    ConfigurationNotFound(NodeType),

    #[error("connector not found: {handle} on {node_id}")]
    ConnectorNotFound { node_id: NodeId, handle: HandleId },

    #[error("cannot connect {from} to {to}")]
    IncompatibleTypes { from: ConnectorType, to: ConnectorType },

    #[error("{label} only accepts one connection")]
    SingleConnection { label: String },

    #[error("{label} accepts at most {max} connections")]
    TooManyConnections { label: String, max: usize },

    #[error("{label} is already connected to this output")]
    DuplicateConnection { label: String },

    #[error("mutual exclusion: {reason}")]
    MutualExclusion { reason: String },
}

/// A proposed edge, before it has an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCandidate {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<HandleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<HandleId>,
}

impl EdgeCandidate {
    pub fn new(
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: Some(source_handle.into()),
            target_handle: Some(target_handle.into()),
        }
    }

    pub fn source_port(&self) -> &str {
        self.source_handle.as_deref().unwrap_or(DEFAULT_HANDLE)
    }

    pub fn target_port(&self) -> &str {
        self.target_handle.as_deref().unwrap_or(DEFAULT_HANDLE)
    }

    /// Turn the candidate into an edge with the given id
    pub fn into_edge(self, id: impl Into<String>) -> Edge {
        Edge {
            id: id.into(),
            source: self.source,
            target: self.target,
            source_handle: self.source_handle,
            target_handle: self.target_handle,
        }
    }
}

impl From<&Edge> for EdgeCandidate {
    fn from(edge: &Edge) -> Self {
        Self {
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_handle: edge.source_handle.clone(),
            target_handle: edge.target_handle.clone(),
        }
    }
}

/// Serializable validation verdict for UI callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCheck {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Validate a proposed edge against the registry and the current edges
pub fn validate_connection(
    candidate: &EdgeCandidate,
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
) -> Result<(), ConnectionError> {
    // 1. endpoints
    let source = graph
        .find_node(&candidate.source)
        .ok_or_else(|| ConnectionError::NodeNotFound(candidate.source.clone()))?;
    let target = graph
        .find_node(&candidate.target)
        .ok_or_else(|| ConnectionError::NodeNotFound(candidate.target.clone()))?;
    if source.id == target.id {
        return Err(ConnectionError::SelfConnection);
    }

    // 2. configurations
    let source_config = registry
        .get(source.node_type())
        .ok_or(ConnectionError::ConfigurationNotFound(source.node_type()))?;
    let target_config = registry
        .get(target.node_type())
        .ok_or(ConnectionError::ConfigurationNotFound(target.node_type()))?;

    // 3. connectors
    let output = source_config
        .find_output(candidate.source_port())
        .ok_or_else(|| ConnectionError::ConnectorNotFound {
            node_id: source.id.clone(),
            handle: candidate.source_port().to_string(),
        })?;
    let input = target_config
        .find_input(candidate.target_port())
        .ok_or_else(|| ConnectionError::ConnectorNotFound {
            node_id: target.id.clone(),
            handle: candidate.target_port().to_string(),
        })?;

    // 4. types
    if !output.connector_type.is_compatible_with(&input.connector_type) {
        return Err(ConnectionError::IncompatibleTypes {
            from: output.connector_type,
            to: input.connector_type,
        });
    }

    // Handles of existing edges into the target, resolved to connector ids
    let existing: Vec<(&Edge, &str)> = graph
        .incoming_edges(&target.id)
        .filter_map(|e| {
            target_config
                .find_input(e.target_port())
                .map(|c| (e, c.id.as_str()))
        })
        .collect();

    // 5. cardinality
    let same_handle: Vec<&Edge> = existing
        .iter()
        .filter(|(_, handle)| *handle == input.id)
        .map(|(e, _)| *e)
        .collect();
    if !input.accepts_multiple && !same_handle.is_empty() {
        return Err(ConnectionError::SingleConnection {
            label: input.label.clone(),
        });
    }
    if let Some(max) = input.max_connections {
        if same_handle.len() >= max {
            return Err(ConnectionError::TooManyConnections {
                label: input.label.clone(),
                max,
            });
        }
    }
    let duplicate = same_handle.iter().any(|e| {
        e.source == source.id
            && source_config.find_output(e.source_port()).map(|c| &c.id) == Some(&output.id)
    });
    if duplicate {
        return Err(ConnectionError::DuplicateConnection {
            label: input.label.clone(),
        });
    }

    // 6. mutual exclusion on the simulated future edge set
    let future = existing
        .iter()
        .map(|(_, handle)| *handle)
        .chain(std::iter::once(input.id.as_str()));
    for exclusion in &target_config.exclusions {
        if exclusion.is_violated_by(future.clone()) {
            return Err(ConnectionError::MutualExclusion {
                reason: format!(
                    "{} cannot be combined with {}",
                    labels(target_config, &exclusion.first),
                    labels(target_config, &exclusion.second)
                ),
            });
        }
    }

    Ok(())
}

/// Validate and report the outcome as a serializable verdict
pub fn check_connection(
    candidate: &EdgeCandidate,
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
) -> ConnectionCheck {
    match validate_connection(candidate, graph, registry) {
        Ok(()) => ConnectionCheck {
            valid: true,
            reason: None,
        },
        Err(err) => ConnectionCheck {
            valid: false,
            reason: Some(err.to_string()),
        },
    }
}

fn labels(config: &crate::descriptor::NodeConfiguration, handles: &[HandleId]) -> String {
    handles
        .iter()
        .map(|h| config.input_label(h))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;

    fn registry() -> NodeRegistry {
        NodeRegistry::with_builtins()
    }

    fn media_graph() -> WorkflowGraph {
        WorkflowBuilder::new("wf", "Validation")
            .add_node("upload-1", NodeType::ImageUpload)
            .add_node("upload-2", NodeType::ImageUpload)
            .add_node("prompt-1", NodeType::Prompt)
            .add_node("upscale", NodeType::Upscale)
            .add_node("video", NodeType::VideoGeneration)
            .add_node("gallery", NodeType::ImageOutput)
            .add_node("imagegen", NodeType::ImageGeneration)
            .build()
    }

    #[test]
    fn test_image_to_image_is_valid() {
        let graph = media_graph();
        let candidate = EdgeCandidate::new("upload-1", "image", "upscale", "image");
        assert!(validate_connection(&candidate, &graph, &registry()).is_ok());
    }

    #[test]
    fn test_image_to_text_is_rejected() {
        let graph = media_graph();
        let candidate = EdgeCandidate::new("upload-1", "image", "video", "prompt");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert_eq!(
            err,
            ConnectionError::IncompatibleTypes {
                from: ConnectorType::Image,
                to: ConnectorType::Text
            }
        );
        assert_eq!(err.to_string(), "cannot connect image to text");
    }

    #[test]
    fn test_image_to_images_is_valid() {
        let graph = media_graph();
        let candidate = EdgeCandidate::new("upload-1", "image", "gallery", "images");
        assert!(validate_connection(&candidate, &graph, &registry()).is_ok());
    }

    #[test]
    fn test_images_to_image_is_rejected() {
        let graph = WorkflowBuilder::from_graph(media_graph())
            .add_edge("prompt-1", "prompt", "imagegen", "prompt")
            .build();
        let candidate = EdgeCandidate::new("imagegen", "images", "upscale", "image");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert!(matches!(err, ConnectionError::IncompatibleTypes { .. }));
    }

    #[test]
    fn test_second_edge_into_single_connector_is_rejected() {
        let graph = WorkflowBuilder::from_graph(media_graph())
            .add_edge("upload-1", "image", "upscale", "image")
            .build();
        let candidate = EdgeCandidate::new("upload-2", "image", "upscale", "image");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert_eq!(err.to_string(), "Image only accepts one connection");
    }

    #[test]
    fn test_frames_and_references_are_mutually_exclusive() {
        let graph = WorkflowBuilder::from_graph(media_graph())
            .add_edge("upload-1", "image", "video", "first_frame")
            .build();
        let candidate = EdgeCandidate::new("upload-2", "image", "video", "reference_images");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert!(matches!(err, ConnectionError::MutualExclusion { .. }));
        assert!(err.to_string().contains("First Frame/Last Frame"));

        // The frames themselves combine freely
        let candidate = EdgeCandidate::new("upload-2", "image", "video", "last_frame");
        assert!(validate_connection(&candidate, &graph, &registry()).is_ok());
    }

    #[test]
    fn test_rule_order_node_before_connector() {
        let graph = media_graph();
        let candidate = EdgeCandidate::new("ghost", "nope", "upscale", "nope");
        assert_eq!(
            validate_connection(&candidate, &graph, &registry()),
            Err(ConnectionError::NodeNotFound("ghost".into()))
        );
    }

    #[test]
    fn test_missing_configuration() {
        let graph = media_graph();
        let mut narrowed = registry();
        narrowed.remove(NodeType::Upscale);
        let candidate = EdgeCandidate::new("upload-1", "image", "upscale", "image");
        assert_eq!(
            validate_connection(&candidate, &graph, &narrowed),
            Err(ConnectionError::ConfigurationNotFound(NodeType::Upscale))
        );
    }

    #[test]
    fn test_unknown_connector() {
        let graph = media_graph();
        let candidate = EdgeCandidate::new("upload-1", "image", "video", "middle_frame");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectorNotFound { handle, .. } if handle == "middle_frame"));
    }

    #[test]
    fn test_default_handles_resolve_single_connectors() {
        let graph = media_graph();
        let candidate = EdgeCandidate {
            source: "upload-1".into(),
            target: "upscale".into(),
            source_handle: None,
            target_handle: None,
        };
        assert!(validate_connection(&candidate, &graph, &registry()).is_ok());
    }

    #[test]
    fn test_max_connections_on_video_references() {
        let mut builder = WorkflowBuilder::from_graph(media_graph());
        for i in 0..3 {
            builder = builder
                .add_node(format!("ref-{}", i), NodeType::ImageUpload)
                .add_edge(format!("ref-{}", i), "image", "video", "reference_images");
        }
        let graph = builder.build();
        let candidate = EdgeCandidate::new("upload-1", "image", "video", "reference_images");
        let err = validate_connection(&candidate, &graph, &registry()).unwrap_err();
        assert_eq!(err.to_string(), "Reference Images accepts at most 3 connections");
    }

    #[test]
    fn test_duplicate_and_self_connections() {
        let graph = WorkflowBuilder::from_graph(media_graph())
            .add_edge("upload-1", "image", "gallery", "images")
            .build();
        let candidate = EdgeCandidate::new("upload-1", "image", "gallery", "images");
        assert!(matches!(
            validate_connection(&candidate, &graph, &registry()),
            Err(ConnectionError::DuplicateConnection { .. })
        ));

        let candidate = EdgeCandidate::new("upscale", "image", "upscale", "image");
        assert_eq!(
            validate_connection(&candidate, &graph, &registry()),
            Err(ConnectionError::SelfConnection)
        );
    }

    #[test]
    fn test_check_connection_is_side_effect_free() {
        let graph = media_graph();
        let before = graph.snapshot();
        let check = check_connection(
            &EdgeCandidate::new("upload-1", "image", "video", "prompt"),
            &graph,
            &registry(),
        );
        assert!(!check.valid);
        assert_eq!(check.reason.as_deref(), Some("cannot connect image to text"));
        assert_eq!(graph.snapshot(), before);
    }
}
