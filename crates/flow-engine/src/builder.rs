//! Programmatic graph construction
//!
//! The builder writes nodes and edges straight into a [`WorkflowGraph`]
//! without running the connection validator, so it can also produce the
//! invalid graphs (cycles, dangling edges) that tests need. Interactive
//! edits go through
//! [`WorkflowController::connect`](crate::controller::WorkflowController::connect).

use crate::settings::NodeSettings;
use crate::types::{Edge, Node, NodeType, WorkflowGraph};

/// Horizontal spacing of auto-placed nodes
const COLUMN_WIDTH: f64 = 200.0;

/// Fluent builder for workflow graphs
///
/// # Example
///
/// ```ignore
/// let graph = WorkflowBuilder::new("wf-1", "Poster")
///     .add_node("prompt-1", NodeType::Prompt)
///     .with_settings(NodeSettings::prompt("a lighthouse at night"))
///     .add_node("image-1", NodeType::ImageGeneration)
///     .add_edge("prompt-1", "prompt", "image-1", "prompt")
///     .build();
/// ```
pub struct WorkflowBuilder {
    graph: WorkflowGraph,
}

impl WorkflowBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::from_graph(WorkflowGraph::new(id, name))
    }

    /// Keep adding to an existing graph
    pub fn from_graph(graph: WorkflowGraph) -> Self {
        Self { graph }
    }

    /// Add a node with its type's default settings, placed in the next column
    pub fn add_node(mut self, id: impl Into<String>, node_type: NodeType) -> Self {
        let column = self.graph.nodes.len() as f64;
        self.graph
            .nodes
            .push(Node::new(id, node_type).at(column * COLUMN_WIDTH, 0.0));
        self
    }

    /// Replace the settings of the last added node
    ///
    /// Settings of another type change the node's type with them.
    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.data.settings = settings;
        }
        self
    }

    /// Move the last added node
    pub fn at(mut self, x: f64, y: f64) -> Self {
        if let Some(node) = self.graph.nodes.last_mut() {
            node.position = (x, y);
        }
        self
    }

    /// Connect two named connectors under a generated `edge-N` id
    pub fn add_edge(
        mut self,
        source: impl Into<String>,
        source_handle: impl Into<String>,
        target: impl Into<String>,
        target_handle: impl Into<String>,
    ) -> Self {
        let id = self.next_edge_id();
        self.graph
            .edges
            .push(Edge::new(id, source, source_handle, target, target_handle));
        self
    }

    /// Connect two nodes without naming connectors, so both ends resolve
    /// through the `"default"` handle
    pub fn add_default_edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        let id = self.next_edge_id();
        self.graph.edges.push(Edge {
            id,
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        });
        self
    }

    pub fn build(self) -> WorkflowGraph {
        self.graph
    }

    /// First `edge-N` id not already taken
    fn next_edge_id(&self) -> String {
        (self.graph.edges.len() + 1..)
            .map(|n| format!("edge-{}", n))
            .find(|id| self.graph.edges.iter().all(|e| &e.id != id))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_to_output() {
        let graph = WorkflowBuilder::new("wf-1", "Caption")
            .add_node("p", NodeType::Prompt)
            .with_settings(NodeSettings::prompt("a quiet harbor"))
            .add_node("out", NodeType::TextOutput)
            .add_edge("p", "prompt", "out", "text")
            .build();

        assert_eq!(graph.id, "wf-1");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges[0].id, "edge-1");
        assert_eq!(graph.nodes[0].data.settings, NodeSettings::prompt("a quiet harbor"));
        assert_eq!(graph.nodes[1].position, (200.0, 0.0));
    }

    #[test]
    fn test_edge_ids_skip_taken_ones() {
        let mut graph = WorkflowBuilder::new("wf-1", "Fan out")
            .add_node("a", NodeType::Prompt)
            .add_node("b", NodeType::TextOutput)
            .add_edge("a", "prompt", "b", "text")
            .build();
        graph.edges[0].id = "edge-2".into();

        let graph = WorkflowBuilder::from_graph(graph)
            .add_node("c", NodeType::Preview)
            .at(50.0, 300.0)
            .add_default_edge("a", "c")
            .build();

        assert_eq!(graph.edges[1].id, "edge-3");
        assert_eq!(graph.edges[1].target_port(), "default");
        assert_eq!(graph.nodes[2].position, (50.0, 300.0));
    }
}
