//! Workflow execution
//!
//! Runs nodes one at a time in topological order. Each node moves through
//! `ready -> executing -> completed | error`; a failure halts the rest of
//! the run. The graph lock is held while a node is prepared and finished,
//! and released while an action handler is awaited, so edits made during a
//! long generation are seen by later nodes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::descriptor::ExecutionMode;
use crate::error::{FlowEngineError, Result};
use crate::events::{emit, EventSink, WorkflowEvent};
use crate::handler::{ActionHandler, HandlerRegistry};
use crate::propagation;
use crate::registry::NodeRegistry;
use crate::scheduler;
use crate::types::{NodeId, NodeStatus, NodeType, PortValues, WorkflowGraph};

/// The graph shared between the engine, the validator and user edits
pub type SharedGraph = Arc<RwLock<WorkflowGraph>>;

/// Cooperative cancellation flag, checked between nodes
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What a finished full-graph run did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    /// Scheduled order
    pub order: Vec<NodeId>,
    /// Nodes that completed, in execution order
    pub completed: Vec<NodeId>,
    /// Nodes removed or replaced while the run was in progress
    pub skipped: Vec<NodeId>,
    pub duration_ms: u64,
}

enum Prepared {
    Action {
        handler: Arc<dyn ActionHandler>,
        node_type: NodeType,
        inputs: PortValues,
    },
    Computed(PortValues),
    Failed(String),
}

enum NodeOutcome {
    Completed,
    Skipped,
}

/// Sequential executor for a workflow graph
pub struct WorkflowEngine {
    registry: Arc<NodeRegistry>,
    handlers: Arc<HandlerRegistry>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<NodeRegistry>, handlers: Arc<HandlerRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self {
            registry,
            handlers,
            events,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every node in topological order, stopping at the first failure
    ///
    /// Scheduling errors are returned before any status is touched.
    pub async fn run_workflow(&self, graph: &SharedGraph, abort: &AbortSignal) -> Result<RunSummary> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timer = Instant::now();

        let order = {
            let mut g = graph.write().await;
            let order = scheduler::execution_order(&g).map_err(|e| {
                log::error!("Workflow '{}' cannot run: {}", g.id, e);
                FlowEngineError::Schedule(e)
            })?;
            let isolated = scheduler::isolated_nodes(&g);
            if g.nodes.len() > 1 && !isolated.is_empty() {
                log::debug!("Nodes without connections: {:?}", isolated);
            }
            self.reset_locked(&mut g);
            order
        };

        log::info!("Starting workflow run {} ({} nodes)", execution_id, order.len());
        emit(
            self.events.as_ref(),
            WorkflowEvent::WorkflowStarted {
                execution_id: execution_id.clone(),
                order: order.clone(),
            },
        );

        let mut completed = Vec::new();
        let mut skipped = Vec::new();
        for node_id in &order {
            if abort.is_aborted() {
                log::info!("Workflow run {} aborted before '{}'", execution_id, node_id);
                return Err(self.cancelled(&execution_id, None));
            }

            match self.execute_node(graph, node_id, abort).await {
                Ok(NodeOutcome::Completed) => completed.push(node_id.clone()),
                Ok(NodeOutcome::Skipped) => skipped.push(node_id.clone()),
                Err(FlowEngineError::Cancelled { node_id }) => {
                    log::info!("Workflow run {} aborted", execution_id);
                    return Err(self.cancelled(&execution_id, node_id));
                }
                Err(e) => {
                    log::error!("Workflow run {} failed at '{}': {}", execution_id, node_id, e);
                    emit(
                        self.events.as_ref(),
                        WorkflowEvent::WorkflowFailed {
                            execution_id: execution_id.clone(),
                            node_id: Some(node_id.clone()),
                            error: e.node_message(),
                        },
                    );
                    return Err(e);
                }
            }
        }

        let duration_ms = timer.elapsed().as_millis() as u64;
        log::info!("Workflow run {} completed in {}ms", execution_id, duration_ms);
        emit(
            self.events.as_ref(),
            WorkflowEvent::WorkflowCompleted {
                execution_id: execution_id.clone(),
            },
        );

        Ok(RunSummary {
            execution_id,
            started_at,
            order,
            completed,
            skipped,
            duration_ms,
        })
    }

    /// Re-run one node from the inputs already propagated onto it
    ///
    /// A finished node is reset first. Returns the node's new outputs.
    pub async fn run_node(&self, graph: &SharedGraph, node_id: &str, abort: &AbortSignal) -> Result<PortValues> {
        {
            let mut g = graph.write().await;
            let node = g.node_mut(node_id)?;
            match node.status() {
                NodeStatus::Executing => {
                    return Err(FlowEngineError::AlreadyExecuting(node_id.to_string()));
                }
                status if status.is_finished() => {
                    node.reset();
                    emit(self.events.as_ref(), WorkflowEvent::node_updated(node));
                }
                _ => {}
            }
        }

        match self.execute_node(graph, node_id, abort).await? {
            NodeOutcome::Completed => {
                let g = graph.read().await;
                Ok(g.node(node_id)?.data.outputs.clone())
            }
            NodeOutcome::Skipped => Err(FlowEngineError::NodeNotFound(node_id.to_string())),
        }
    }

    /// Return every finished node to ready; returns how many changed
    pub async fn reset(&self, graph: &SharedGraph) -> usize {
        let mut g = graph.write().await;
        self.reset_locked(&mut g)
    }

    fn reset_locked(&self, graph: &mut WorkflowGraph) -> usize {
        let mut count = 0;
        for node in graph.nodes.iter_mut() {
            if node.reset() {
                emit(self.events.as_ref(), WorkflowEvent::node_updated(node));
                count += 1;
            }
        }
        count
    }

    async fn execute_node(&self, graph: &SharedGraph, node_id: &str, abort: &AbortSignal) -> Result<NodeOutcome> {
        let prepared = {
            let mut g = graph.write().await;
            if !g.contains_node(node_id) {
                log::warn!("Node '{}' was removed during the run, skipping", node_id);
                return Ok(NodeOutcome::Skipped);
            }
            self.prepare(&mut g, node_id)?
        };

        let result = match prepared {
            Prepared::Action {
                handler,
                node_type,
                inputs,
            } => {
                log::debug!("Executing {} node '{}'", node_type, node_id);
                handler.execute(node_id, node_type, inputs).await
            }
            Prepared::Computed(outputs) => Ok(outputs),
            Prepared::Failed(message) => Err(FlowEngineError::failed(message)),
        };

        self.finish(graph, node_id, result, abort).await
    }

    /// Gather inputs, mark the node executing and decide how to produce outputs
    fn prepare(&self, g: &mut WorkflowGraph, node_id: &str) -> Result<Prepared> {
        let pulled = propagation::pull_inputs(g, &self.registry, node_id);

        let node = g.node_mut(node_id)?;
        node.transition(NodeStatus::Executing)?;
        emit(self.events.as_ref(), WorkflowEvent::node_updated(node));

        if let Err(e) = pulled {
            return Ok(Prepared::Failed(e.node_message()));
        }

        let node_type = node.node_type();
        let Some(config) = self.registry.get(node_type) else {
            return Ok(Prepared::Failed(format!("configuration not found for {}", node_type)));
        };

        if let Some(missing) = config
            .required_inputs()
            .find(|c| !node.data.settings.has_input(&c.id))
        {
            return Ok(Prepared::Failed(format!(
                "missing required input: {}",
                missing.label
            )));
        }

        if config.execution_mode() == ExecutionMode::Reactive {
            let outputs = node.data.settings.recompute().unwrap_or_default();
            return Ok(Prepared::Computed(outputs));
        }

        match self.handlers.get(node_type) {
            Some(handler) => Ok(Prepared::Action {
                handler,
                node_type,
                inputs: node.data.settings.handler_inputs(),
            }),
            None => Ok(Prepared::Failed(format!(
                "no handler registered for {}",
                node_type
            ))),
        }
    }

    /// Record the result of a node and propagate its outputs
    async fn finish(
        &self,
        graph: &SharedGraph,
        node_id: &str,
        result: Result<PortValues>,
        abort: &AbortSignal,
    ) -> Result<NodeOutcome> {
        let mut g = graph.write().await;
        let Some(node) = g.find_node_mut(node_id) else {
            log::warn!("Node '{}' was removed while executing, discarding its result", node_id);
            return Ok(NodeOutcome::Skipped);
        };
        if node.status() != NodeStatus::Executing {
            log::warn!("Node '{}' was replaced while executing, discarding its result", node_id);
            return Ok(NodeOutcome::Skipped);
        }

        if abort.is_aborted() {
            node.fail("cancelled")?;
            emit(self.events.as_ref(), WorkflowEvent::node_updated(node));
            return Err(FlowEngineError::Cancelled {
                node_id: Some(node_id.to_string()),
            });
        }

        match result {
            Ok(outputs) => {
                node.data.outputs = outputs;
                node.transition(NodeStatus::Completed)?;
                emit(self.events.as_ref(), WorkflowEvent::node_updated(node));

                let touched = propagation::propagate_outputs(
                    &mut g,
                    &self.registry,
                    self.events.as_ref(),
                    node_id,
                    self.config.transitive_propagation,
                );
                log::debug!("Node '{}' completed, updated {:?}", node_id, touched);
                Ok(NodeOutcome::Completed)
            }
            Err(e) => {
                let message = e.node_message();
                log::warn!("Node '{}' failed: {}", node_id, message);
                node.fail(message.clone())?;
                emit(self.events.as_ref(), WorkflowEvent::node_updated(node));
                Err(FlowEngineError::NodeFailed {
                    node_id: node_id.to_string(),
                    message,
                })
            }
        }
    }

    fn cancelled(&self, execution_id: &str, node_id: Option<NodeId>) -> FlowEngineError {
        emit(
            self.events.as_ref(),
            WorkflowEvent::WorkflowCancelled {
                execution_id: execution_id.to_string(),
                node_id: node_id.clone(),
            },
        );
        FlowEngineError::Cancelled { node_id }
    }
}
