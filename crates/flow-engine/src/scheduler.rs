//! Execution ordering
//!
//! Kahn's algorithm over `source -> target` edges. Ordering is purely
//! structural: node types, statuses and data are never consulted. Ties are
//! broken by insertion order (node order for the initial frontier, edge
//! order for nodes released later), so the same graph always yields the
//! same order.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use crate::types::{NodeId, WorkflowGraph};

/// Why a graph could not be ordered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Every node has an incoming edge
    #[error("no start nodes found")]
    NoStartNodes,

    /// Some nodes sit on or behind a cycle
    #[error("circular dependency detected")]
    CircularDependency { unresolved: Vec<NodeId> },
}

impl ScheduleError {
    /// Both variants imply a cycle: a finite graph without a start node has one
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::NoStartNodes | Self::CircularDependency { .. })
    }
}

/// Compute a topological execution order for every node in the graph
///
/// Edges pointing at missing nodes are ignored. An empty graph yields an
/// empty order.
pub fn execution_order(graph: &WorkflowGraph) -> Result<Vec<NodeId>, ScheduleError> {
    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; graph.nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    for edge in &graph.edges {
        if let (Some(&from), Some(&to)) = (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            dependents[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..graph.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    if queue.is_empty() && !graph.nodes.is_empty() {
        return Err(ScheduleError::NoStartNodes);
    }

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(current) = queue.pop_front() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < graph.nodes.len() {
        let unresolved = (0..graph.nodes.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| graph.nodes[i].id.clone())
            .collect();
        return Err(ScheduleError::CircularDependency { unresolved });
    }

    Ok(order.into_iter().map(|i| graph.nodes[i].id.clone()).collect())
}

/// Nodes with no incoming edges, in insertion order
pub fn start_nodes(graph: &WorkflowGraph) -> Vec<NodeId> {
    graph
        .nodes
        .iter()
        .filter(|n| graph.incoming_edges(&n.id).next().is_none())
        .map(|n| n.id.clone())
        .collect()
}

/// Nodes not touched by any edge
pub fn isolated_nodes(graph: &WorkflowGraph) -> Vec<NodeId> {
    graph
        .nodes
        .iter()
        .filter(|n| !graph.edges.iter().any(|e| e.touches(&n.id)))
        .map(|n| n.id.clone())
        .collect()
}
