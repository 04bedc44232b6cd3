//! Review capability for human-in-the-loop checkpoints.
//!
//! The trait lives in `dworkers-core` so that both `dworkers-autonomy` (which
//! implements the reviewers) and `dworkers-orchestrator` (which gates steps
//! on them) can share it without circular deps.

use crate::DworkersResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of handing a deliverable to a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// The deliverable may proceed.
    Approved,
    /// The deliverable was rejected.
    Rejected {
        /// Reviewer-supplied reason.
        reason: String,
    },
    /// The review will happen out of band; the checkpoint stays pending.
    Pending {
        /// Id of the stored checkpoint to resolve later.
        checkpoint_id: String,
    },
}

impl ReviewOutcome {
    /// `true` only for [`ReviewOutcome::Approved`].
    pub fn is_approved(&self) -> bool {
        matches!(self, ReviewOutcome::Approved)
    }
}

/// Reviews a worker's deliverable at a phase boundary.
/// Implementations can auto-approve, park the deliverable for later
/// resolution, or block until a human decides.
#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    /// Decide on `deliverable`, produced by `worker_name` during `phase`.
    async fn on_checkpoint(
        &self,
        worker_name: &str,
        phase: &str,
        deliverable: &serde_json::Value,
    ) -> DworkersResult<ReviewOutcome>;
}
