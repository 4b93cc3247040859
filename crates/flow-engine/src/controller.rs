//! Graph controller
//!
//! The single owner of a workflow graph. Every user edit, connection check,
//! run and command goes through a [`WorkflowController`], which emits the
//! matching events on its own [`EventSink`] and records undo history.
//!
//! Runs are serialized: a second run waits for the first. Edits are not
//! blocked by a run; they take the graph lock briefly and are visible to
//! nodes that have not started yet.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, MutexGuard};

use crate::config::EngineConfig;
use crate::engine::{AbortSignal, RunSummary, SharedGraph, WorkflowEngine};
use crate::error::{FlowEngineError, Result};
use crate::events::{self, emit, EngineCommand, EventSink, WorkflowEvent};
use crate::handler::HandlerRegistry;
use crate::propagation;
use crate::registry::NodeRegistry;
use crate::settings::NodeSettings;
use crate::types::{Edge, Node, NodeId, NodeType, PortValues, WorkflowGraph, WorkflowSnapshot};
use crate::undo::UndoStack;
use crate::validation::{self, ConnectionCheck, EdgeCandidate};

pub struct WorkflowController {
    graph: SharedGraph,
    registry: Arc<NodeRegistry>,
    engine: WorkflowEngine,
    events: Arc<dyn EventSink>,
    history: Mutex<UndoStack>,
    run_lock: tokio::sync::Mutex<()>,
    abort: AbortSignal,
}

impl WorkflowController {
    /// Take ownership of a graph; its current state becomes the first history entry
    pub fn new(
        graph: WorkflowGraph,
        registry: Arc<NodeRegistry>,
        handlers: Arc<HandlerRegistry>,
        events: Arc<dyn EventSink>,
        config: EngineConfig,
    ) -> Self {
        let mut history = UndoStack::new(config.history_limit);
        if let Err(e) = history.push(&graph.snapshot()) {
            log::warn!("Could not record initial history entry: {}", e);
        }

        let engine = WorkflowEngine::new(registry.clone(), handlers, events.clone()).with_config(config);

        Self {
            graph: Arc::new(tokio::sync::RwLock::new(graph)),
            registry,
            engine,
            events,
            history: Mutex::new(history),
            run_lock: tokio::sync::Mutex::new(()),
            abort: AbortSignal::new(),
        }
    }

    /// Shared handle to the graph, for read access by hosts
    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.graph.read().await.snapshot()
    }

    pub async fn node(&self, node_id: &str) -> Result<Node> {
        self.graph.read().await.node(node_id).cloned()
    }

    /// Replace the graph from a snapshot and record it in history
    ///
    /// Returns how many dangling edges were dropped.
    pub async fn restore(&self, snapshot: WorkflowSnapshot) -> Result<usize> {
        let _idle = self.lock_idle()?;
        let mut g = self.graph.write().await;
        let dropped = self.apply_snapshot(&mut g, snapshot);
        self.record(&g);
        Ok(dropped)
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Add a node with default settings, returning its generated id
    pub async fn add_node(&self, node_type: NodeType, position: (f64, f64)) -> Result<NodeId> {
        let id = format!("{}-{}", node_type, uuid::Uuid::new_v4());
        let node = Node::new(id.clone(), node_type).at(position.0, position.1);
        self.insert_node(node).await?;
        Ok(id)
    }

    /// Add a fully built node; reactive nodes get their outputs computed
    pub async fn insert_node(&self, mut node: Node) -> Result<()> {
        node.data.settings.validate()?;
        if let Some(outputs) = node.data.settings.recompute() {
            node.data.outputs = outputs;
        }

        let mut g = self.graph.write().await;
        g.add_node(node.clone())?;
        log::debug!("Added {} node '{}'", node.node_type(), node.id);
        emit(self.events.as_ref(), WorkflowEvent::NodeAdded { node });
        self.record(&g);
        Ok(())
    }

    /// Remove a node and every edge touching it
    ///
    /// Inputs that were fed by the node are re-gathered, which clears them
    /// unless another edge still feeds the same connector.
    pub async fn remove_node(&self, node_id: &str) -> Result<Node> {
        let mut g = self.graph.write().await;
        let (node, edges) = g
            .remove_node(node_id)
            .ok_or_else(|| FlowEngineError::NodeNotFound(node_id.to_string()))?;

        for edge in &edges {
            emit(
                self.events.as_ref(),
                WorkflowEvent::EdgeRemoved {
                    edge_id: edge.id.clone(),
                },
            );
        }
        emit(
            self.events.as_ref(),
            WorkflowEvent::NodeRemoved {
                node_id: node_id.to_string(),
            },
        );

        for edge in edges.iter().filter(|e| e.target != node_id) {
            self.refresh_edge_target(&mut g, edge);
        }

        log::debug!("Removed node '{}' and {} edges", node_id, edges.len());
        self.record(&g);
        Ok(node)
    }

    /// Replace a node's settings
    ///
    /// Connected input fields are re-gathered afterwards, so values arriving
    /// over edges win over edited ones. Reactive nodes recompute and push
    /// their outputs downstream.
    pub async fn update_settings(&self, node_id: &str, settings: NodeSettings) -> Result<()> {
        settings.validate()?;

        let mut g = self.graph.write().await;
        let node = g.node_mut(node_id)?;
        if node.node_type() != settings.node_type() {
            return Err(FlowEngineError::InvalidSettings(format!(
                "cannot apply {} settings to {} node '{}'",
                settings.node_type(),
                node.node_type(),
                node_id
            )));
        }
        if node.data.settings == settings {
            return Ok(());
        }
        node.data.settings = settings;

        if let Err(e) = propagation::pull_inputs(&mut g, &self.registry, node_id) {
            log::warn!("Could not re-gather inputs of '{}': {}", node_id, e);
        }
        emit(self.events.as_ref(), WorkflowEvent::node_updated(g.node(node_id)?));

        self.push_outputs(&mut g, node_id)?;
        self.record(&g);
        Ok(())
    }

    /// Set or clear the image held by an image upload node
    pub async fn set_upload(&self, node_id: &str, image: Option<String>) -> Result<()> {
        let mut g = self.graph.write().await;
        let node = g.node_mut(node_id)?;
        match &mut node.data.settings {
            NodeSettings::ImageUpload(s) => s.image = image,
            other => {
                return Err(FlowEngineError::InvalidSettings(format!(
                    "'{}' is a {} node, not an image upload",
                    node_id,
                    other.node_type()
                )));
            }
        }
        emit(self.events.as_ref(), WorkflowEvent::node_updated(node));

        self.push_outputs(&mut g, node_id)?;
        self.record(&g);
        Ok(())
    }

    /// Recompute a node and push its outputs to its direct successors
    ///
    /// Returns the ids of nodes whose inputs changed.
    pub async fn refresh_node(&self, node_id: &str) -> Result<Vec<NodeId>> {
        let mut g = self.graph.write().await;
        self.push_outputs(&mut g, node_id)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    /// Check a proposed edge without changing anything
    pub async fn check_connection(&self, candidate: &EdgeCandidate) -> ConnectionCheck {
        let g = self.graph.read().await;
        validation::check_connection(candidate, &g, &self.registry)
    }

    /// Validate and add an edge, then push the source's current value across it
    pub async fn connect(&self, candidate: EdgeCandidate) -> Result<Edge> {
        let mut g = self.graph.write().await;
        if let Err(e) = validation::validate_connection(&candidate, &g, &self.registry) {
            log::debug!("Rejected connection {} -> {}: {}", candidate.source, candidate.target, e);
            return Err(e.into());
        }

        let edge = candidate.into_edge(format!("edge-{}", uuid::Uuid::new_v4()));
        g.edges.push(edge.clone());
        emit(self.events.as_ref(), WorkflowEvent::EdgeAdded { edge: edge.clone() });

        match propagation::propagate_edge(&mut g, &self.registry, self.events.as_ref(), &edge.id) {
            Ok(true) if self.engine.config().transitive_propagation => {
                self.push_outputs(&mut g, &edge.target)?;
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not propagate across new edge '{}': {}", edge.id, e),
        }

        self.record(&g);
        Ok(edge)
    }

    /// Remove an edge and re-gather the input it fed
    pub async fn disconnect(&self, edge_id: &str) -> Result<Edge> {
        let mut g = self.graph.write().await;
        let edge = g
            .remove_edge(edge_id)
            .ok_or_else(|| FlowEngineError::EdgeNotFound(edge_id.to_string()))?;
        emit(
            self.events.as_ref(),
            WorkflowEvent::EdgeRemoved {
                edge_id: edge.id.clone(),
            },
        );

        self.refresh_edge_target(&mut g, &edge);
        self.record(&g);
        Ok(edge)
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run the whole graph; waits for any run already in progress
    pub async fn run_workflow(&self) -> Result<RunSummary> {
        let _run = self.run_lock.lock().await;
        self.abort.clear();
        self.engine.run_workflow(&self.graph, &self.abort).await
    }

    /// Re-run a single node
    pub async fn run_node(&self, node_id: &str) -> Result<PortValues> {
        let _run = self.run_lock.lock().await;
        self.abort.clear();
        self.engine.run_node(&self.graph, node_id, &self.abort).await
    }

    /// Ask the current run to stop before its next node
    pub fn abort(&self) {
        log::info!("Abort requested");
        self.abort.abort();
    }

    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Return every finished node to ready
    pub async fn reset(&self) -> usize {
        let _run = self.run_lock.lock().await;
        self.engine.reset(&self.graph).await
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Step back one history entry; `false` when there is nothing to undo
    pub async fn undo(&self) -> Result<bool> {
        let _idle = self.lock_idle()?;
        let step = self.history.lock().undo();
        self.step_history(step).await
    }

    /// Step forward one history entry; `false` when there is nothing to redo
    pub async fn redo(&self) -> Result<bool> {
        let _idle = self.lock_idle()?;
        let step = self.history.lock().redo();
        self.step_history(step).await
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// A command channel sized by `EngineConfig::command_buffer`, ready for [`serve`](Self::serve)
    pub fn command_channel(&self) -> (mpsc::Sender<EngineCommand>, mpsc::Receiver<EngineCommand>) {
        events::command_channel(self.engine.config().command_buffer)
    }

    pub async fn handle_command(&self, command: EngineCommand) -> Result<()> {
        log::debug!("Handling command {:?}", command);
        match command {
            EngineCommand::ExecuteNode { node_id } => self.run_node(&node_id).await.map(|_| ()),
            EngineCommand::RefreshNode { node_id } => self.refresh_node(&node_id).await.map(|_| ()),
            EngineCommand::RunWorkflow => self.run_workflow().await.map(|_| ()),
            EngineCommand::Reset => {
                self.reset().await;
                Ok(())
            }
        }
    }

    /// Process commands one at a time until every sender is dropped
    ///
    /// A failing command is logged; its effect on the graph has already
    /// been reported through events.
    pub async fn serve(&self, mut commands: mpsc::Receiver<EngineCommand>) {
        while let Some(command) = commands.recv().await {
            if let Err(e) = self.handle_command(command).await {
                log::warn!("Command failed: {}", e);
            }
        }
        log::debug!("Command channel closed");
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Hold off runs for the rest of a history step
    fn lock_idle(&self) -> Result<MutexGuard<'_, ()>> {
        self.run_lock.try_lock().map_err(|_| FlowEngineError::RunInProgress)
    }

    fn record(&self, graph: &WorkflowGraph) {
        if let Err(e) = self.history.lock().push(&graph.snapshot()) {
            log::warn!("Could not record history entry: {}", e);
        }
    }

    async fn step_history(&self, step: Option<Result<WorkflowSnapshot>>) -> Result<bool> {
        let Some(snapshot) = step.transpose()? else {
            return Ok(false);
        };
        let mut g = self.graph.write().await;
        self.apply_snapshot(&mut g, snapshot);
        Ok(true)
    }

    fn apply_snapshot(&self, graph: &mut WorkflowGraph, snapshot: WorkflowSnapshot) -> usize {
        let dropped = graph.restore(snapshot);
        log::debug!(
            "Graph '{}' restored with {} nodes and {} edges",
            graph.id,
            graph.nodes.len(),
            graph.edges.len()
        );
        emit(
            self.events.as_ref(),
            WorkflowEvent::GraphRestored {
                node_count: graph.nodes.len(),
                edge_count: graph.edges.len(),
            },
        );
        dropped
    }

    /// Recompute a reactive node, then push its outputs one hop (or onward
    /// when transitive propagation is on)
    fn push_outputs(&self, graph: &mut WorkflowGraph, node_id: &str) -> Result<Vec<NodeId>> {
        propagation::recompute_outputs(graph, self.events.as_ref(), node_id)?;
        Ok(propagation::propagate_outputs(
            graph,
            &self.registry,
            self.events.as_ref(),
            node_id,
            self.engine.config().transitive_propagation,
        ))
    }

    /// Re-gather the connector a removed edge used to feed
    fn refresh_edge_target(&self, graph: &mut WorkflowGraph, edge: &Edge) {
        let Some(handle) = propagation::resolved_target_handle(graph, &self.registry, edge) else {
            return;
        };
        match propagation::refresh_input(graph, &self.registry, self.events.as_ref(), &edge.target, &handle) {
            Ok(true) if self.engine.config().transitive_propagation => {
                if let Err(e) = self.push_outputs(graph, &edge.target) {
                    log::warn!("Could not refresh '{}': {}", edge.target, e);
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("Could not clear '{}.{}': {}", edge.target, handle, e),
        }
    }
}
