//! Plan engine: compiles consulting plans into dependency graphs and runs
//! them as bounded-concurrency pipelines with checkpoint-gated review.
//!
//! # Main types
//!
//! - [`Plan`] / [`PlanStep`]: Static DAG definition.
//! - [`PlanRegistry`]: Named plans, optionally seeded with the built-in templates.
//! - [`PlanGraph`]: Validated, layered dependency graph.
//! - [`PlanBuilder`]: Binds a plan to a tenant, workers and a reviewer.
//! - [`Pipeline`]: Runs, resumes and cancels plan executions.
//! - [`PipelineResult`]: Per-step outcomes and the final output of a run.
//! - [`WorkerMonitor`]: Per-role status and metrics.
//! - [`ProjectOrchestrator`]: Runs a free-form brief as an ad-hoc plan.

/// Plan builder.
pub mod builder;
/// Progress events.
pub mod events;
/// Dependency graph compilation.
pub mod graph;
/// Worker status and metrics.
pub mod monitor;
/// Pipeline executor.
pub mod pipeline;
/// Plan and step definitions.
pub mod plan;
/// Free-form project orchestration.
pub mod project;
/// Plan registry.
pub mod registry;
/// Built-in plan templates.
pub mod templates;
/// Run result types.
pub mod types;

pub use builder::PlanBuilder;
pub use events::PipelineEvent;
pub use graph::PlanGraph;
pub use monitor::{WorkerMetrics, WorkerMonitor, WorkerState, WorkerStatus};
pub use pipeline::{render_prompt, Pipeline};
pub use plan::{InputMapping, Plan, PlanStep};
pub use project::{map_to_workers, ProjectOrchestrator, ProjectResult, ProjectWorkspace};
pub use registry::PlanRegistry;
pub use templates::builtin_templates;
pub use types::{
    NodeError, NodeErrorKind, NodeResult, NodeStatus, PipelineResult, PipelineStatus,
};
