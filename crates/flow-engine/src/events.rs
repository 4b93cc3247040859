//! Event and command channels for a workflow graph
//!
//! Events flow out of the engine to the host (UI, logger, test harness) and
//! report every change to node data, graph structure and run progress.
//! Commands flow in and ask the engine to do something, such as re-running
//! a single node.
//!
//! Both channels are owned by the graph's controller; there is no
//! process-wide bus.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::{Edge, EdgeId, Node, NodeData, NodeId};

/// Receiver of workflow events
///
/// Called with the graph lock held, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError>;
}

/// The receiving side of a sink has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event receiver was dropped")]
pub struct EventError;

/// Events emitted by the graph owner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// A node's settings, outputs or status changed
    #[serde(rename_all = "camelCase")]
    NodeUpdated { node_id: NodeId, data: NodeData },

    /// A node was added
    #[serde(rename_all = "camelCase")]
    NodeAdded { node: Node },

    /// A node was removed along with its edges
    #[serde(rename_all = "camelCase")]
    NodeRemoved { node_id: NodeId },

    #[serde(rename_all = "camelCase")]
    EdgeAdded { edge: Edge },

    #[serde(rename_all = "camelCase")]
    EdgeRemoved { edge_id: EdgeId },

    /// The whole graph was replaced (snapshot restore, undo, redo)
    #[serde(rename_all = "camelCase")]
    GraphRestored { node_count: usize, edge_count: usize },

    /// Workflow execution started
    #[serde(rename_all = "camelCase")]
    WorkflowStarted {
        execution_id: String,
        order: Vec<NodeId>,
    },

    /// Workflow execution completed successfully
    #[serde(rename_all = "camelCase")]
    WorkflowCompleted { execution_id: String },

    /// Workflow execution failed
    #[serde(rename_all = "camelCase")]
    WorkflowFailed {
        execution_id: String,
        node_id: Option<NodeId>,
        error: String,
    },

    /// Workflow execution was aborted
    #[serde(rename_all = "camelCase")]
    WorkflowCancelled {
        execution_id: String,
        node_id: Option<NodeId>,
    },
}

impl WorkflowEvent {
    /// Create a node updated event from the node's current data
    pub fn node_updated(node: &Node) -> Self {
        Self::NodeUpdated {
            node_id: node.id.clone(),
            data: node.data.clone(),
        }
    }

    /// The node this event is about, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeUpdated { node_id, .. } | Self::NodeRemoved { node_id } => Some(node_id),
            Self::NodeAdded { node } => Some(&node.id),
            Self::WorkflowFailed { node_id, .. } | Self::WorkflowCancelled { node_id, .. } => {
                node_id.as_deref()
            }
            _ => None,
        }
    }
}

/// Commands accepted by a controller's command loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineCommand {
    /// Re-run one node from its propagated inputs
    #[serde(rename_all = "camelCase")]
    ExecuteNode { node_id: NodeId },
    /// Recompute a reactive node and push its outputs downstream
    #[serde(rename_all = "camelCase")]
    RefreshNode { node_id: NodeId },
    /// Run the whole graph
    RunWorkflow,
    /// Return every finished node to ready
    Reset,
}

/// Create a bounded command channel
pub fn command_channel(buffer: usize) -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineCommand>) {
    mpsc::channel(buffer.max(1))
}

/// Discards every event
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: WorkflowEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Keeps every event in memory, in emission order
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Node ids of every `NodeUpdated` event, in order
    pub fn updated_nodes(&self) -> Vec<NodeId> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                WorkflowEvent::NodeUpdated { node_id, .. } => Some(node_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel
///
/// Unbounded so that emitting never blocks while the graph lock is held.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: WorkflowEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError)
    }
}

/// Send an event, logging instead of failing when the sink is gone
pub(crate) fn emit(sink: &dyn EventSink, event: WorkflowEvent) {
    if let Err(e) = sink.send(event) {
        log::warn!("Dropping workflow event: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();
        let node = Node::new("n1", NodeType::Prompt);

        sink.send(WorkflowEvent::node_updated(&node)).unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorkflowEvent::NodeUpdated { node_id, data } => {
                assert_eq!(node_id, "n1");
                assert_eq!(data, &node.data);
            }
            _ => panic!("Expected NodeUpdated event"),
        }
        assert_eq!(sink.updated_nodes(), vec!["n1"]);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink_accepts_everything() {
        let sink = NullEventSink;
        assert!(sink
            .send(WorkflowEvent::WorkflowCompleted {
                execution_id: "exec1".into(),
            })
            .is_ok());
    }

    #[tokio::test]
    async fn test_channel_event_sink() {
        let (sink, mut rx) = ChannelEventSink::channel();
        sink.send(WorkflowEvent::EdgeRemoved { edge_id: "e1".into() }).unwrap();

        match rx.recv().await {
            Some(WorkflowEvent::EdgeRemoved { edge_id }) => assert_eq!(edge_id, "e1"),
            other => panic!("Expected EdgeRemoved, got {:?}", other),
        }

        drop(rx);
        let err = sink
            .send(WorkflowEvent::EdgeRemoved { edge_id: "e2".into() })
            .unwrap_err();
        assert_eq!(err, EventError);
        assert_eq!(err.to_string(), "event receiver was dropped");
    }

    #[test]
    fn test_event_wire_format() {
        let event = WorkflowEvent::WorkflowFailed {
            execution_id: "x".into(),
            node_id: Some("b".into()),
            error: "boom".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "workflowFailed");
        assert_eq!(value["nodeId"], "b");
        assert_eq!(event.node_id(), Some("b"));

        let command: EngineCommand =
            serde_json::from_value(serde_json::json!({"type": "executeNode", "nodeId": "n1"})).unwrap();
        assert_eq!(command, EngineCommand::ExecuteNode { node_id: "n1".into() });
    }
}
