//! flow-run - execute workflow files from the command line

mod config;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use flow_engine::scheduler::isolated_nodes;
use flow_engine::{
    execution_order, ChannelEventSink, HandlerRegistry, NodeRegistry, NodeStatus, WorkflowController,
    WorkflowEvent, WorkflowGraph,
};
use flow_nodes::{register_generation_handlers, GenerationClient};
use tokio::sync::mpsc::UnboundedReceiver;

use config::{load_workflow, RunnerConfig};

/// Run media generation workflows
#[derive(Parser)]
#[command(name = "flow-run")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every node of a workflow file
    Run {
        /// Path to the workflow JSON (`{ nodes, edges }`)
        workflow: PathBuf,

        /// Runner configuration file
        #[arg(short, long, env = "FLOW_CONFIG")]
        config: Option<PathBuf>,

        /// Generation API base URL
        #[arg(long, env = "FLOW_BASE_URL")]
        base_url: Option<String>,

        /// Bearer token for the generation API
        #[arg(long, env = "FLOW_API_TOKEN", hide_env_values = true)]
        api_token: Option<String>,

        /// Forward updates past the first hop
        #[arg(long)]
        transitive: bool,

        /// Write the finished workflow here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a workflow file and print its execution order
    Check {
        /// Path to the workflow JSON
        workflow: PathBuf,
    },

    /// List the node catalog
    Nodes,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            workflow,
            config,
            base_url,
            api_token,
            transitive,
            output,
        } => {
            let config = RunnerConfig::load(config.as_deref())
                .await?
                .with_overrides(base_url, api_token, transitive);
            run(&workflow, config, output.as_deref()).await
        }
        Commands::Check { workflow } => check(&workflow).await,
        Commands::Nodes => {
            list_nodes();
            Ok(())
        }
    }
}

async fn run(workflow: &Path, config: RunnerConfig, output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let snapshot = load_workflow(workflow).await?;
    let name = workflow_name(workflow);

    let client = Arc::new(GenerationClient::new(config.generation)?);
    let mut handlers = HandlerRegistry::new();
    register_generation_handlers(&mut handlers, client);

    let (sink, events) = ChannelEventSink::channel();
    let controller = Arc::new(WorkflowController::new(
        WorkflowGraph::new(name.clone(), name),
        Arc::new(NodeRegistry::with_builtins()),
        Arc::new(handlers),
        Arc::new(sink),
        config.engine,
    ));
    let logger = tokio::spawn(log_events(events));

    let dropped = controller.restore(snapshot).await?;
    if dropped > 0 {
        log::warn!("{} edges referenced missing nodes and were dropped", dropped);
    }

    let abort = controller.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, aborting workflow");
            abort.abort();
        }
    });

    let result = controller.run_workflow().await;

    let finished = controller.snapshot().await;
    for node in &finished.nodes {
        let marker = match node.status() {
            NodeStatus::Completed => "ok",
            NodeStatus::Error => "error",
            NodeStatus::Executing => "running",
            NodeStatus::Ready => "-",
        };
        println!("[{:>7}] {} ({})", marker, node.id, node.data.settings.node_type());
        if let Some(error) = &node.data.error {
            println!("          {}", error);
        }
        for (port, value) in &node.data.outputs {
            println!("          {} = {}", port, preview(value));
        }
    }

    if let Some(path) = output {
        flow_engine::config::save_json(&finished, path).await?;
        log::info!("Saved workflow to {:?}", path);
    }

    // The sink lives as long as the controller; dropping both ends the logger.
    interrupt.abort();
    interrupt.await.ok();
    drop(controller);
    logger.await.ok();

    let summary = result?;
    log::info!(
        "Run {} finished: {} of {} nodes in {}ms",
        summary.execution_id,
        summary.completed.len(),
        summary.order.len(),
        summary.duration_ms
    );
    Ok(())
}

async fn check(workflow: &Path) -> Result<(), Box<dyn Error>> {
    let snapshot = load_workflow(workflow).await?;
    let registry = NodeRegistry::with_builtins();
    let mut graph = WorkflowGraph::new("check", workflow_name(workflow));
    let dropped = graph.restore(snapshot);
    if dropped > 0 {
        println!("{} edges reference missing nodes", dropped);
    }

    for node in &graph.nodes {
        if let Err(e) = node.data.settings.validate() {
            println!("{}: {}", node.id, e);
        }
        if registry.get(node.data.settings.node_type()).is_none() {
            println!("{}: unknown node type", node.id);
        }
    }

    let isolated = isolated_nodes(&graph);
    if !isolated.is_empty() {
        println!("Isolated: {}", isolated.join(", "));
    }

    let order = execution_order(&graph)?;
    for (i, node_id) in order.iter().enumerate() {
        println!("{:>3}. {}", i + 1, node_id);
    }
    Ok(())
}

fn list_nodes() {
    let registry = NodeRegistry::with_builtins();
    for config in registry.all() {
        println!("{} [{:?}] {}", config.node_type, config.category, config.description);
        for input in &config.inputs {
            let required = if input.required { " (required)" } else { "" };
            println!("    <- {}: {:?}{}", input.id, input.connector_type, required);
        }
        for output in &config.outputs {
            println!("    -> {}: {:?}", output.id, output.connector_type);
        }
    }
}

async fn log_events(mut events: UnboundedReceiver<WorkflowEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            WorkflowEvent::WorkflowStarted { execution_id, order } => {
                log::info!("Run {} started: {} nodes", execution_id, order.len());
            }
            WorkflowEvent::NodeUpdated { node_id, data } => {
                log::debug!("{} is {:?}", node_id, data.status);
            }
            WorkflowEvent::WorkflowFailed { node_id, error, .. } => {
                log::error!("Run failed at {}: {}", node_id.as_deref().unwrap_or("?"), error);
            }
            WorkflowEvent::WorkflowCancelled { node_id, .. } => {
                log::warn!("Run cancelled at {}", node_id.as_deref().unwrap_or("?"));
            }
            _ => {}
        }
    }
}

fn workflow_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workflow".to_string())
}

/// Shorten long values (data URIs) for terminal output
fn preview(value: &serde_json::Value) -> String {
    const MAX: usize = 120;
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text
    }
}
