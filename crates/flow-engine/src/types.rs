//! Core types for workflow graphs
//!
//! These types define the structure of workflow graphs: nodes, edges,
//! connector types, per-node status and the snapshot used at the
//! persistence boundary.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FlowEngineError, Result};
use crate::settings::NodeSettings;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// Identifier of a connector on a node
pub type HandleId = String;

/// Values keyed by connector id
pub type PortValues = HashMap<String, serde_json::Value>;

/// Handle used when an edge does not name one
pub const DEFAULT_HANDLE: &str = "default";

/// The data type carried by a connector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorType {
    /// Prompt or generated text
    Text,
    /// A single image (URL or base64 data)
    Image,
    /// A list of images
    Images,
    /// A single video (URL or base64 data)
    Video,
    /// Aspect ratio, duration and resolution bundle
    Format,
    /// Accepts anything
    Any,
}

impl ConnectorType {
    /// Check if an output of this type can feed an input of `target` type
    pub fn is_compatible_with(&self, target: &ConnectorType) -> bool {
        // Any type is compatible with everything
        if matches!(self, ConnectorType::Any) || matches!(target, ConnectorType::Any) {
            return true;
        }

        // A single image can join an image list
        if matches!(self, ConnectorType::Image) && matches!(target, ConnectorType::Images) {
            return true;
        }

        self == target
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Images => "images",
            Self::Video => "video",
            Self::Format => "format",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of node types known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Prompt,
    ImageUpload,
    Format,
    PromptConcatenator,
    ImageGeneration,
    VideoGeneration,
    TextGeneration,
    Upscale,
    ImageOutput,
    VideoOutput,
    TextOutput,
    Preview,
}

impl NodeType {
    /// Every node type, in palette order
    pub const ALL: [NodeType; 12] = [
        NodeType::Prompt,
        NodeType::ImageUpload,
        NodeType::Format,
        NodeType::PromptConcatenator,
        NodeType::ImageGeneration,
        NodeType::VideoGeneration,
        NodeType::TextGeneration,
        NodeType::Upscale,
        NodeType::ImageOutput,
        NodeType::VideoOutput,
        NodeType::TextOutput,
        NodeType::Preview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::ImageUpload => "imageUpload",
            Self::Format => "format",
            Self::PromptConcatenator => "promptConcatenator",
            Self::ImageGeneration => "imageGeneration",
            Self::VideoGeneration => "videoGeneration",
            Self::TextGeneration => "textGeneration",
            Self::Upscale => "upscale",
            Self::ImageOutput => "imageOutput",
            Self::VideoOutput => "videoOutput",
            Self::TextOutput => "textOutput",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Ready,
    Executing,
    Completed,
    Error,
}

impl NodeStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    ///
    /// Forward moves are `ready -> executing -> completed | error`.
    /// The only backward move is the explicit reset of a finished node.
    pub fn can_transition_to(&self, next: NodeStatus) -> bool {
        matches!(
            (self, next),
            (NodeStatus::Ready, NodeStatus::Executing)
                | (NodeStatus::Executing, NodeStatus::Completed)
                | (NodeStatus::Executing, NodeStatus::Error)
                | (NodeStatus::Completed, NodeStatus::Ready)
                | (NodeStatus::Error, NodeStatus::Ready)
        )
    }

    /// Completed or errored
    pub fn is_finished(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Error)
    }
}

/// An edge connecting an output connector to an input connector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique identifier for this edge
    pub id: EdgeId,
    /// Source node ID
    pub source: NodeId,
    /// Target node ID
    pub target: NodeId,
    /// Source connector, `"default"` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<HandleId>,
    /// Target connector, `"default"` when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<HandleId>,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
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

    /// Whether this edge touches the given node on either end
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Per-node state: typed settings plus what the engine records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Configuration fields, tagged by node type
    pub settings: NodeSettings,
    /// Produced values keyed by output connector id
    #[serde(default)]
    pub outputs: PortValues,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeData {
    pub fn new(settings: NodeSettings) -> Self {
        Self {
            settings,
            outputs: PortValues::new(),
            status: NodeStatus::Ready,
            error: None,
        }
    }
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier for this node instance
    pub id: NodeId,
    pub data: NodeData,
    /// Position in the UI (x, y)
    #[serde(default)]
    pub position: (f64, f64),
}

impl Node {
    /// Create a node with the default settings for its type
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self::with_settings(id, NodeSettings::default_for(node_type))
    }

    pub fn with_settings(id: impl Into<String>, settings: NodeSettings) -> Self {
        Self {
            id: id.into(),
            data: NodeData::new(settings),
            position: (0.0, 0.0),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = (x, y);
        self
    }

    /// The node's type, derived from its settings variant
    pub fn node_type(&self) -> NodeType {
        self.data.settings.node_type()
    }

    pub fn status(&self) -> NodeStatus {
        self.data.status
    }

    /// Move to a new status, enforcing the lifecycle
    pub fn transition(&mut self, next: NodeStatus) -> Result<()> {
        if !self.data.status.can_transition_to(next) {
            return Err(FlowEngineError::InvalidTransition {
                node_id: self.id.clone(),
                from: self.data.status,
                to: next,
            });
        }
        self.data.status = next;
        if next != NodeStatus::Error {
            self.data.error = None;
        }
        Ok(())
    }

    /// Mark an executing node as failed with a message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(NodeStatus::Error)?;
        self.data.error = Some(message.into());
        Ok(())
    }

    /// Explicit reset of a finished node; returns whether anything changed
    pub fn reset(&mut self) -> bool {
        if self.data.status.is_finished() {
            self.data.status = NodeStatus::Ready;
            self.data.error = None;
            true
        } else {
            false
        }
    }

    /// Drop an in-flight execution that can no longer finish
    ///
    /// Returns whether the node was executing.
    pub fn interrupt(&mut self) -> bool {
        if self.data.status == NodeStatus::Executing {
            self.data.status = NodeStatus::Ready;
            self.data.error = None;
            true
        } else {
            false
        }
    }
}

/// Serializable `{ nodes, edges }` form of a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A complete workflow graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    /// Unique identifier for this graph
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Nodes in insertion order
    pub nodes: Vec<Node>,
    /// Edges in insertion order
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Find a node by ID or fail with `NodeNotFound`
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.find_node(id)
            .ok_or_else(|| FlowEngineError::NodeNotFound(id.to_string()))
    }

    pub fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.find_node_mut(id)
            .ok_or_else(|| FlowEngineError::NodeNotFound(id.to_string()))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    /// Find an edge by ID
    pub fn find_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Get edges coming into a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Get edges going out of a node
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Get the IDs of nodes that this node depends on (upstream nodes)
    pub fn get_dependencies(&self, node_id: &str) -> Vec<NodeId> {
        self.incoming_edges(node_id).map(|e| e.source.clone()).collect()
    }

    /// Get the IDs of nodes that depend on this node (downstream nodes)
    pub fn get_dependents(&self, node_id: &str) -> Vec<NodeId> {
        self.outgoing_edges(node_id).map(|e| e.target.clone()).collect()
    }

    /// Add a node; ids must be unique
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.contains_node(&node.id) {
            return Err(FlowEngineError::DuplicateNode(node.id));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node together with every edge referencing it
    pub fn remove_node(&mut self, node_id: &str) -> Option<(Node, Vec<Edge>)> {
        let pos = self.nodes.iter().position(|n| n.id == node_id)?;
        let node = self.nodes.remove(pos);
        let (removed, kept): (Vec<Edge>, Vec<Edge>) = std::mem::take(&mut self.edges)
            .into_iter()
            .partition(|e| e.touches(node_id));
        self.edges = kept;
        Some((node, removed))
    }

    /// Remove an edge by ID
    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        let pos = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(pos))
    }

    /// Copy out the persistence form of this graph
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
        }
    }

    /// Replace nodes and edges from a snapshot
    ///
    /// Executions are not restored: nodes saved as executing come back
    /// ready. Edges whose endpoints are missing are dropped. Returns how
    /// many were dropped.
    pub fn restore(&mut self, snapshot: WorkflowSnapshot) -> usize {
        let WorkflowSnapshot { nodes, edges } = snapshot;
        self.nodes = nodes;
        for node in self.nodes.iter_mut() {
            if node.interrupt() {
                log::debug!("Node '{}' was saved mid-execution, restored as ready", node.id);
            }
        }
        let total = edges.len();
        self.edges = edges
            .into_iter()
            .filter(|e| {
                let keep = self.contains_node(&e.source) && self.contains_node(&e.target);
                if !keep {
                    log::warn!(
                        "Dropping edge '{}' with a missing endpoint ({} -> {})",
                        e.id,
                        e.source,
                        e.target
                    );
                }
                keep
            })
            .collect();
        total - self.edges.len()
    }
}
