//! Error types for the flow engine

use thiserror::Error;

use crate::scheduler::ScheduleError;
use crate::types::{NodeId, NodeStatus};
use crate::validation::ConnectionError;

/// Result type alias using FlowEngineError
pub type Result<T> = std::result::Result<T, FlowEngineError>;

/// Errors that can occur in the flow engine
#[derive(Debug, Error)]
pub enum FlowEngineError {
    /// A node id did not resolve
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// An edge id did not resolve
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// A proposed edge was rejected at edit time
    #[error("Invalid connection: {0}")]
    Connection(#[from] ConnectionError),

    /// The graph could not be ordered for execution
    #[error("Cannot schedule workflow: {0}")]
    Schedule(#[from] ScheduleError),

    /// A node failed during a run
    #[error("Node '{node_id}' failed: {message}")]
    NodeFailed { node_id: NodeId, message: String },

    /// An action handler reported a failure
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// The run was aborted
    #[error("Workflow cancelled")]
    Cancelled { node_id: Option<NodeId> },

    /// A status change that the lifecycle does not allow
    #[error("Invalid status transition for '{node_id}': {from:?} -> {to:?}")]
    InvalidTransition {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    /// A single-node run was requested for a node that is mid-run
    #[error("node is already executing: {0}")]
    AlreadyExecuting(NodeId),

    /// The graph cannot be replaced while a run holds it
    #[error("a workflow run is in progress")]
    RunInProgress,

    /// Settings were rejected
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A value arriving on a connector could not be stored
    #[error("Invalid input for '{handle}': {message}")]
    InvalidInput { handle: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowEngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Create an invalid input error for a connector
    pub fn invalid_input(handle: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            handle: handle.into(),
            message: msg.into(),
        }
    }

    /// The message recorded on a node when this error fails it
    pub fn node_message(&self) -> String {
        match self {
            Self::ExecutionFailed(msg) => msg.clone(),
            Self::NodeFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
