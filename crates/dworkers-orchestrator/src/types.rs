use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every step succeeded.
    Completed,
    /// A step failed and was not ignored.
    Failed,
    /// At least one step is parked on a pending checkpoint.
    NeedsReview,
    /// The run was cancelled.
    Cancelled,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::Failed => write!(f, "failed"),
            PipelineStatus::NeedsReview => write!(f, "needs_review"),
            PipelineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// State of one step within a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not started.
    #[default]
    Pending,
    /// Produced an output.
    Success,
    /// Failed after all attempts, or rejected in review.
    Failed,
    /// Never ran because of an upstream failure or a halt.
    Skipped,
    /// Output produced, review pending.
    AwaitingReview,
    /// Stopped by cancellation.
    Cancelled,
}

impl NodeStatus {
    /// Whether the node will not change again within this run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Success | NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Success => write!(f, "success"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::Skipped => write!(f, "skipped"),
            NodeStatus::AwaitingReview => write!(f, "awaiting_review"),
            NodeStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Why a step did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeErrorKind {
    /// The worker failed or panicked.
    StepExecution,
    /// A reviewer rejected the output.
    CheckpointRejected,
    /// An attempt ran past `timeout_seconds`.
    Timeout,
    /// The step never ran.
    Skipped,
    /// The run was cancelled.
    Cancelled,
}

/// Why a node did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    /// Failure category.
    pub kind: NodeErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl NodeError {
    /// Error of `kind`.
    pub fn new(kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Step state.
    pub status: NodeStatus,
    /// `true` only for `success`.
    pub success: bool,
    /// Worker output, also kept while awaiting review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Set for failed, skipped and cancelled steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
    /// Time spent, retries included.
    #[serde(default)]
    pub duration_ms: u64,
    /// Worker invocations made, retries included.
    #[serde(default)]
    pub attempts: u32,
    /// Checkpoint gating the output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl NodeResult {
    /// Not yet started.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Succeeded with `output`.
    pub fn succeeded(output: serde_json::Value) -> Self {
        Self {
            status: NodeStatus::Success,
            success: true,
            output: Some(output),
            ..Self::default()
        }
    }

    /// Failed with an error of `kind`.
    pub fn failed(kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Failed,
            error: Some(NodeError::new(kind, message)),
            ..Self::default()
        }
    }

    /// Skipped for `reason`.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: NodeStatus::Skipped,
            error: Some(NodeError::new(NodeErrorKind::Skipped, reason)),
            ..Self::default()
        }
    }

    /// Stopped by cancellation.
    pub fn cancelled() -> Self {
        Self {
            status: NodeStatus::Cancelled,
            error: Some(NodeError::new(NodeErrorKind::Cancelled, "run cancelled")),
            ..Self::default()
        }
    }

    /// Output held behind `checkpoint_id`.
    pub fn awaiting_review(checkpoint_id: impl Into<String>, deliverable: serde_json::Value) -> Self {
        Self {
            status: NodeStatus::AwaitingReview,
            output: Some(deliverable),
            checkpoint_id: Some(checkpoint_id.into()),
            ..Self::default()
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Unique per run; kept across resumes.
    pub run_id: String,
    /// Plan name.
    pub pipeline: String,
    /// Overall outcome.
    pub status: PipelineStatus,
    /// True iff `status` is `completed`.
    pub success: bool,
    /// Wall-clock time of this execution.
    pub duration_ms: u64,
    /// Per-step outcomes keyed by step id.
    pub nodes: BTreeMap<String, NodeResult>,
    /// Sink output(s) of a completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<serde_json::Value>,
    /// The step whose failure decided the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<String>,
    /// Message of the failure in `failed_node`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The run's inputs, kept so a suspended run can be resumed.
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

impl PipelineResult {
    /// Outcome of `step_id`.
    pub fn node(&self, step_id: &str) -> Option<&NodeResult> {
        self.nodes.get(step_id)
    }

    /// Steps parked on a pending checkpoint, by id.
    pub fn awaiting_review(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.status == NodeStatus::AwaitingReview)
            .map(|(id, _)| id.as_str())
            .collect()
    }
}
