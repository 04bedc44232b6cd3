//! `dworkers` command line: run plans and projects, review checkpoints and
//! serve the HTTP gateway.

mod checkpoint_watcher;
mod tenant_watcher;

use checkpoint_watcher::CheckpointWatcher;
use clap::{Parser, Subcommand};
use dworkers_core::{DworkersConfig, FailureStrategy, ReviewMode};
use dworkers_gateway::{AppState, GatewayServer, RunOptions};
use dworkers_orchestrator::{NodeStatus, PipelineResult, PipelineStatus, ProjectOrchestrator};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tenant_watcher::TenantWatcher;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dworkers", about = "dworkers: digital worker plans for consulting teams")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "dworkers.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect tenants
    Tenant {
        #[command(subcommand)]
        action: TenantAction,
    },
    /// Inspect, run and resume plans
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },
    /// Review pending checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Run a free-form project brief
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
}

#[derive(Subcommand)]
enum TenantAction {
    /// List registered tenants
    List,
    /// Print one tenant's configuration
    Show { id: String },
}

#[derive(Subcommand)]
enum PlanAction {
    /// List available plans
    List,
    /// Print a plan's steps and execution layers
    Show { name: String },
    /// Run a plan for a tenant
    Run {
        name: String,
        #[arg(long)]
        tenant: String,
        /// Pipeline input as key=value; values that parse as JSON are kept typed
        #[arg(short, long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
        /// skip_downstream, fail_pipeline or ignore
        #[arg(long)]
        strategy: Option<FailureStrategy>,
        #[arg(long)]
        max_concurrent: Option<usize>,
        /// auto, block or suspend
        #[arg(long)]
        review: Option<ReviewMode>,
    },
    /// Resume a run suspended on review
    Resume { run_id: String },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List pending checkpoints
    List,
    /// Approve a pending checkpoint
    Approve { id: String },
    /// Reject a pending checkpoint
    Reject {
        id: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Decompose a brief into tasks, run them and synthesize the results
    Run {
        brief: String,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        project_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = DworkersConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let tenant_dir = config.tenant_config_dir.clone();
            let state = Arc::new(AppState::from_config(config).await?);

            let _watcher = if tenant_dir.is_dir() {
                let tenants = Arc::clone(&state.tenants);
                match TenantWatcher::start(tenant_dir, 500, move |tenant| {
                    tenants.register(tenant);
                }) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        warn!(error = %e, "Tenant hot-reload disabled");
                        None
                    }
                }
            } else {
                None
            };

            let _checkpoint_watcher = state.checkpoint_file().map(Path::to_path_buf).and_then(
                |file| {
                    let runtime = tokio::runtime::Handle::current();
                    let shared = Arc::clone(&state);
                    match CheckpointWatcher::start(file, 200, move || {
                        let shared = Arc::clone(&shared);
                        runtime.spawn(async move {
                            if let Err(e) = shared.refresh_checkpoints().await {
                                warn!(error = %e, "Failed to merge checkpoint file");
                            }
                        });
                    }) {
                        Ok(watcher) => Some(watcher),
                        Err(e) => {
                            warn!(error = %e, "Checkpoint file watching disabled");
                            None
                        }
                    }
                },
            );

            let addr = format!("{host}:{port}");
            info!(addr = %addr, "Starting dworkers gateway");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            GatewayServer::serve(listener, state, shutdown_signal()).await?;
        }
        Commands::Tenant { action } => {
            let state = AppState::from_config(config).await?;
            match action {
                TenantAction::List => {
                    let ids = state.tenants.list();
                    if ids.is_empty() {
                        println!("No tenants registered.");
                        println!("Add tenant files to the tenant_config_dir in dworkers.toml");
                    } else {
                        for id in &ids {
                            let tenant = state.tenants.get(id)?;
                            println!("  {id}  {}", tenant.name);
                        }
                        println!("\nTotal: {} tenant(s)", ids.len());
                    }
                }
                TenantAction::Show { id } => {
                    let tenant = state.tenants.get(&id)?;
                    println!("{}", serde_json::to_string_pretty(&*tenant)?);
                }
            }
        }
        Commands::Plan { action } => {
            if let PlanAction::Run {
                review: Some(mode), ..
            } = &action
            {
                config.review_mode = *mode;
            }
            let state = AppState::from_config(config).await?;
            match action {
                PlanAction::List => {
                    for name in state.plans.list() {
                        let plan = state.plans.get(&name)?;
                        println!("  {name}  {}", plan.description);
                    }
                }
                PlanAction::Show { name } => {
                    let plan = state.plans.get(&name)?;
                    let graph = dworkers_orchestrator::PlanGraph::compile(&plan)?;
                    println!("{}: {}", plan.name, plan.description);
                    println!("\nSteps:");
                    for step in &plan.steps {
                        let deps = if step.depends_on.is_empty() {
                            "-".to_string()
                        } else {
                            step.depends_on.join(", ")
                        };
                        let checkpoint = step
                            .checkpoint
                            .as_deref()
                            .map(|c| format!("  [review: {c}]"))
                            .unwrap_or_default();
                        println!(
                            "  {:<24} {:<13} after: {deps}{checkpoint}",
                            step.step_id,
                            step.worker_role.to_string()
                        );
                    }
                    println!("\nLayers:");
                    for (i, layer) in graph.layers().iter().enumerate() {
                        println!("  {i}: {}", layer.join(", "));
                    }
                }
                PlanAction::Run {
                    name,
                    tenant,
                    inputs,
                    strategy,
                    max_concurrent,
                    review: _,
                } => {
                    let inputs = parse_inputs(&inputs)?;
                    let options = RunOptions {
                        strategy,
                        max_concurrent,
                    };
                    let result = state.execute(&name, &tenant, inputs, options).await?;
                    print_result(&result);
                    return Ok(exit_code(&result));
                }
                PlanAction::Resume { run_id } => {
                    let result = state.resume(&run_id).await?;
                    print_result(&result);
                    return Ok(exit_code(&result));
                }
            }
        }
        Commands::Checkpoint { action } => {
            let state = AppState::from_config(config).await?;
            match action {
                CheckpointAction::List => {
                    let pending = state.pending_checkpoints().await?;
                    if pending.is_empty() {
                        println!("No pending checkpoints.");
                    }
                    for cp in pending {
                        println!(
                            "  {}  {}  {}  {}",
                            cp.id,
                            cp.worker_name,
                            cp.phase,
                            cp.created_at.to_rfc3339()
                        );
                    }
                }
                CheckpointAction::Approve { id } => {
                    let cp = state.approve_checkpoint(&id).await?;
                    println!("Approved checkpoint {} ({})", cp.id, cp.worker_name);
                }
                CheckpointAction::Reject { id, reason } => {
                    let cp = state.reject_checkpoint(&id, &reason).await?;
                    println!("Rejected checkpoint {} ({})", cp.id, cp.worker_name);
                }
            }
        }
        Commands::Project { action } => match action {
            ProjectAction::Run {
                brief,
                tenant,
                project_id,
            } => {
                let state = AppState::from_config(config).await?;
                let tenant = state.tenants.get(&tenant)?;
                let project_id =
                    project_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let result = ProjectOrchestrator::new(tenant, &project_id)
                    .with_factory(Arc::clone(&state.factory))
                    .with_config(state.config.clone())
                    .run(&brief)
                    .await;
                println!(
                    "Project {project_id}: {} in {} ms",
                    if result.success { "succeeded" } else { "failed" },
                    result.duration_ms
                );
                println!("{}", serde_json::to_string_pretty(&result.deliverables)?);
                if !result.success {
                    return Ok(ExitCode::FAILURE);
                }
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Parse `key=value` pairs. Values that are valid JSON keep their type;
/// anything else is a string.
fn parse_inputs(pairs: &[String]) -> anyhow::Result<serde_json::Map<String, Value>> {
    let mut inputs = serde_json::Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid input '{pair}', expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid input '{pair}', empty key");
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        inputs.insert(key.to_string(), value);
    }
    Ok(inputs)
}

fn print_result(result: &PipelineResult) {
    println!(
        "Run {} ({}): {} in {} ms",
        result.run_id, result.pipeline, result.status, result.duration_ms
    );
    for (id, node) in &result.nodes {
        let detail = match node.status {
            NodeStatus::AwaitingReview => node
                .checkpoint_id
                .as_deref()
                .map(|cp| format!("checkpoint {cp}"))
                .unwrap_or_default(),
            NodeStatus::Failed | NodeStatus::Skipped => node
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_default(),
            _ if node.attempts > 1 => format!("{} attempts", node.attempts),
            _ => String::new(),
        };
        println!("  {id:<24} {:<16} {detail}", node.status.to_string());
    }

    match result.status {
        PipelineStatus::Completed => {
            if let Some(output) = &result.final_output {
                let text = match output {
                    Value::String(s) => s.clone(),
                    other => serde_json::to_string_pretty(other).unwrap_or_default(),
                };
                println!("\n{text}");
            }
        }
        PipelineStatus::NeedsReview => {
            println!(
                "\nAwaiting review: {}. Approve or reject, then run `dworkers plan resume {}`.",
                result.awaiting_review().join(", "),
                result.run_id
            );
        }
        PipelineStatus::Failed | PipelineStatus::Cancelled => {}
    }
    if let (Some(node), Some(error)) = (&result.failed_node, &result.error) {
        println!("\nFailed at '{node}': {error}");
    }
}

fn exit_code(result: &PipelineResult) -> ExitCode {
    match result.status {
        PipelineStatus::Failed | PipelineStatus::Cancelled => ExitCode::FAILURE,
        PipelineStatus::Completed | PipelineStatus::NeedsReview => ExitCode::SUCCESS,
    }
}
