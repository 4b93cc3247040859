//! Flow Engine - Typed workflow graphs for media generation
//!
//! A workflow is a graph of typed nodes (prompts, uploads, generators,
//! output viewers) wired by edges between named connectors. This crate
//! provides:
//!
//! - A closed node catalog with per-type settings and connector declarations
//! - Edit-time connection validation
//! - Deterministic topological scheduling with cycle detection
//! - Sequential async execution with pluggable action handlers
//! - One-hop output propagation along edges
//! - Compressed snapshot-based undo/redo
//!
//! # Architecture
//!
//! - `WorkflowController`: single owner of a graph; edits, runs, history, commands
//! - `WorkflowEngine`: runs nodes in order and records status and outputs
//! - `EventSink`: explicit update channel owned by the controller
//! - `ActionHandler`: async trait implemented by generation backends
//!
//! # Example
//!
//! ```ignore
//! use flow_engine::{EdgeCandidate, NodeType, WorkflowController};
//!
//! let p = controller.add_node(NodeType::Prompt, (0.0, 0.0)).await?;
//! let t = controller.add_node(NodeType::TextGeneration, (200.0, 0.0)).await?;
//! controller.connect(EdgeCandidate::new(&p, "prompt", &t, "prompt")).await?;
//! let summary = controller.run_workflow().await?;
//! ```

pub mod builder;
pub mod config;
pub mod constants;
pub mod controller;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod propagation;
pub mod registry;
pub mod scheduler;
pub mod settings;
pub mod types;
pub mod undo;
pub mod validation;

// Re-export key types
pub use builder::WorkflowBuilder;
pub use config::{ConfigError, EngineConfig};
pub use controller::WorkflowController;
pub use descriptor::{ExecutionMode, InputConnector, NodeCategory, NodeConfiguration, OutputConnector};
pub use engine::{AbortSignal, RunSummary, SharedGraph, WorkflowEngine};
pub use error::{FlowEngineError, Result};
pub use events::{
    command_channel, ChannelEventSink, EngineCommand, EventError, EventSink, NullEventSink,
    VecEventSink, WorkflowEvent,
};
pub use handler::{ActionHandler, CallbackActionHandler, HandlerRegistry};
pub use registry::NodeRegistry;
pub use scheduler::{execution_order, ScheduleError};
pub use settings::NodeSettings;
pub use types::{
    ConnectorType, Edge, EdgeId, HandleId, Node, NodeData, NodeId, NodeStatus, NodeType,
    PortValues, WorkflowGraph, WorkflowSnapshot,
};
pub use undo::UndoStack;
pub use validation::{ConnectionCheck, ConnectionError, EdgeCandidate};
