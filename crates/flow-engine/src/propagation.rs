//! Output propagation across edges
//!
//! When a node's outputs change, every edge leaving it writes the matching
//! output value into the target's input field keyed by the target handle.
//! Values are passed through untransformed, except that a connector
//! accepting several edges receives a list gathered in edge order (image
//! lists are flattened into it).
//!
//! Propagation always re-gathers *all* edges into a `(target, handle)` pair
//! from the current source outputs. That makes it idempotent, safe for
//! fan-in, and lets disconnects reuse the same path to clear a field.
//!
//! Every function here works on an already-locked graph.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use crate::error::{FlowEngineError, Result};
use crate::events::{emit, EventSink, WorkflowEvent};
use crate::registry::NodeRegistry;
use crate::types::{Edge, HandleId, NodeId, WorkflowGraph};

/// The connector id an edge lands on, resolved through the target's configuration
pub fn resolved_target_handle(graph: &WorkflowGraph, registry: &NodeRegistry, edge: &Edge) -> Option<HandleId> {
    let target = graph.find_node(&edge.target)?;
    let config = registry.get(target.node_type())?;
    config.find_input(edge.target_port()).map(|c| c.id.clone())
}

/// The value an edge currently carries from its source
fn source_value<'a>(graph: &'a WorkflowGraph, registry: &NodeRegistry, edge: &Edge) -> Option<&'a Value> {
    let source = graph.find_node(&edge.source)?;
    let port = registry
        .get(source.node_type())
        .and_then(|c| c.find_output(edge.source_port()))
        .map_or(edge.source_port(), |c| c.id.as_str());
    source.data.outputs.get(port).filter(|v| !v.is_null())
}

/// Gather the value for one input connector from all edges feeding it
///
/// Returns `None` when no connected source has produced a value yet.
pub fn gather_input(
    graph: &WorkflowGraph,
    registry: &NodeRegistry,
    target_id: &str,
    handle: &str,
) -> Option<Value> {
    let target = graph.find_node(target_id)?;
    let config = registry.get(target.node_type())?;
    let connector = config.find_input(handle)?;

    let values: Vec<&Value> = graph
        .incoming_edges(target_id)
        .filter(|e| config.find_input(e.target_port()).map(|c| &c.id) == Some(&connector.id))
        .filter_map(|e| source_value(graph, registry, e))
        .collect();

    if !connector.accepts_multiple {
        return values.first().map(|v| (*v).clone());
    }
    if values.is_empty() {
        return None;
    }
    let mut gathered = Vec::new();
    for value in values {
        match value {
            Value::Array(items) => gathered.extend(items.iter().cloned()),
            other => gathered.push(other.clone()),
        }
    }
    Some(Value::Array(gathered))
}

/// Distinct input connectors with at least one incoming edge, in edge order
fn connected_handles(graph: &WorkflowGraph, registry: &NodeRegistry, target_id: &str) -> Vec<HandleId> {
    let mut handles: Vec<HandleId> = Vec::new();
    for edge in graph.incoming_edges(target_id) {
        if let Some(handle) = resolved_target_handle(graph, registry, edge) {
            if !handles.contains(&handle) {
                handles.push(handle);
            }
        }
    }
    handles
}

fn apply_handle(graph: &mut WorkflowGraph, registry: &NodeRegistry, target_id: &str, handle: &str) -> Result<bool> {
    let value = gather_input(graph, registry, target_id, handle);
    let node = graph.node_mut(target_id)?;
    node.data.settings.apply_input(handle, value.as_ref())
}

/// Re-gather one input connector and store it; emits `NodeUpdated` on change
///
/// A connector with no remaining sources is cleared.
pub fn refresh_input(
    graph: &mut WorkflowGraph,
    registry: &NodeRegistry,
    events: &dyn EventSink,
    target_id: &str,
    handle: &str,
) -> Result<bool> {
    let changed = apply_handle(graph, registry, target_id, handle)?;
    if changed {
        let node = graph.node(target_id)?;
        log::debug!("Input '{}' of node '{}' updated", handle, target_id);
        emit(events, WorkflowEvent::node_updated(node));
    }
    Ok(changed)
}

/// Re-gather every connected input of a node without emitting
pub fn pull_inputs(graph: &mut WorkflowGraph, registry: &NodeRegistry, target_id: &str) -> Result<bool> {
    let mut changed = false;
    for handle in connected_handles(graph, registry, target_id) {
        changed |= apply_handle(graph, registry, target_id, &handle)?;
    }
    Ok(changed)
}

/// Recompute a reactive node's outputs from its settings
///
/// Returns whether the outputs changed. Action nodes never change here.
pub fn recompute_outputs(graph: &mut WorkflowGraph, events: &dyn EventSink, node_id: &str) -> Result<bool> {
    let node = graph.node_mut(node_id)?;
    let Some(outputs) = node.data.settings.recompute() else {
        return Ok(false);
    };
    if outputs == node.data.outputs {
        return Ok(false);
    }
    node.data.outputs = outputs;
    emit(events, WorkflowEvent::node_updated(node));
    Ok(true)
}

/// Push a node's outputs to its direct successors
///
/// With `transitive` set, reactive successors recompute and push onward
/// breadth-first, visiting each node at most once. Returns the ids of nodes
/// whose inputs changed.
pub fn propagate_outputs(
    graph: &mut WorkflowGraph,
    registry: &NodeRegistry,
    events: &dyn EventSink,
    source_id: &str,
    transitive: bool,
) -> Vec<NodeId> {
    let mut touched: Vec<NodeId> = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::from([source_id.to_string()]);
    let mut queue: VecDeque<NodeId> = VecDeque::from([source_id.to_string()]);

    while let Some(current) = queue.pop_front() {
        let mut targets: Vec<(NodeId, HandleId)> = Vec::new();
        for edge in graph.outgoing_edges(&current) {
            if let Some(handle) = resolved_target_handle(graph, registry, edge) {
                let pair = (edge.target.clone(), handle);
                if !targets.contains(&pair) {
                    targets.push(pair);
                }
            }
        }

        for (target, handle) in targets {
            match refresh_input(graph, registry, events, &target, &handle) {
                Ok(true) if !touched.contains(&target) => touched.push(target.clone()),
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Could not propagate '{}' into '{}.{}': {}", current, target, handle, e);
                    continue;
                }
            }
            if transitive && visited.insert(target.clone()) {
                match recompute_outputs(graph, events, &target) {
                    Ok(true) => queue.push_back(target),
                    Ok(false) => {}
                    Err(e) => log::warn!("Could not recompute '{}': {}", target, e),
                }
            }
        }
    }

    touched
}

/// Push the value carried by a newly created edge into its target
pub fn propagate_edge(
    graph: &mut WorkflowGraph,
    registry: &NodeRegistry,
    events: &dyn EventSink,
    edge_id: &str,
) -> Result<bool> {
    let edge = graph
        .find_edge(edge_id)
        .cloned()
        .ok_or_else(|| FlowEngineError::EdgeNotFound(edge_id.to_string()))?;
    match resolved_target_handle(graph, registry, &edge) {
        Some(handle) => refresh_input(graph, registry, events, &edge.target, &handle),
        None => Ok(false),
    }
}
