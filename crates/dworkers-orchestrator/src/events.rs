use crate::types::{NodeError, PipelineStatus};
use serde::{Deserialize, Serialize};

/// Progress notifications emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The run began.
    RunStarted {
        /// Run id.
        run_id: String,
        /// Plan name.
        pipeline: String,
        /// Number of steps in the plan.
        steps: usize,
    },
    /// A step attempt began.
    StepStarted {
        /// Step id.
        step_id: String,
        /// 1 for the first attempt.
        attempt: u32,
    },
    /// A step succeeded.
    StepCompleted {
        /// Step id.
        step_id: String,
        /// Time spent, retries included.
        duration_ms: u64,
    },
    /// A step failed for good.
    StepFailed {
        /// Step id.
        step_id: String,
        /// Why it failed.
        error: NodeError,
    },
    /// A step will not run.
    StepSkipped {
        /// Step id.
        step_id: String,
        /// Why it will not run.
        reason: String,
    },
    /// A step's deliverable waits for review.
    StepAwaitingReview {
        /// Step id.
        step_id: String,
        /// Checkpoint to approve or reject.
        checkpoint_id: String,
    },
    /// The run ended or suspended.
    RunFinished {
        /// Run id.
        run_id: String,
        /// Final or suspended status.
        status: PipelineStatus,
        /// Wall-clock time of this execution.
        duration_ms: u64,
    },
}

impl PipelineEvent {
    /// The step this event is about, if any.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            PipelineEvent::StepStarted { step_id, .. }
            | PipelineEvent::StepCompleted { step_id, .. }
            | PipelineEvent::StepFailed { step_id, .. }
            | PipelineEvent::StepSkipped { step_id, .. }
            | PipelineEvent::StepAwaitingReview { step_id, .. } => Some(step_id),
            PipelineEvent::RunStarted { .. } | PipelineEvent::RunFinished { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = PipelineEvent::StepSkipped {
            step_id: "d".into(),
            reason: "upstream 'b' failed".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step_skipped");
        assert_eq!(event.step_id(), Some("d"));
    }
}
