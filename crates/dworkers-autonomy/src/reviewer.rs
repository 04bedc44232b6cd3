use crate::checkpoint::{CheckpointStatus, CheckpointStore};
use async_trait::async_trait;
use dworkers_core::{CheckpointHandler, DworkersResult, ReviewMode, ReviewOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Approves every deliverable without recording anything.
pub struct AutoApproveReviewer;

#[async_trait]
impl CheckpointHandler for AutoApproveReviewer {
    async fn on_checkpoint(
        &self,
        worker_name: &str,
        phase: &str,
        _deliverable: &serde_json::Value,
    ) -> DworkersResult<ReviewOutcome> {
        info!(worker = %worker_name, phase = %phase, "Auto-approved checkpoint");
        Ok(ReviewOutcome::Approved)
    }
}

/// Parks every deliverable in the store and reports it as pending.
/// The run that triggered it ends as `needs_review` and is resumed later.
pub struct PendingReviewer {
    store: Arc<CheckpointStore>,
}

impl PendingReviewer {
    /// Reviewer over `store`.
    pub fn new(store: Arc<CheckpointStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CheckpointHandler for PendingReviewer {
    async fn on_checkpoint(
        &self,
        worker_name: &str,
        phase: &str,
        deliverable: &serde_json::Value,
    ) -> DworkersResult<ReviewOutcome> {
        let cp = self.store.create(deliverable.clone(), worker_name, phase);
        Ok(ReviewOutcome::Pending {
            checkpoint_id: cp.id,
        })
    }
}

/// Creates a checkpoint and blocks the step until it is resolved.
pub struct AwaitingReviewer {
    store: Arc<CheckpointStore>,
    timeout: Option<Duration>,
}

impl AwaitingReviewer {
    /// `timeout` of `None` waits indefinitely.
    pub fn new(store: Arc<CheckpointStore>, timeout: Option<Duration>) -> Self {
        Self { store, timeout }
    }
}

#[async_trait]
impl CheckpointHandler for AwaitingReviewer {
    async fn on_checkpoint(
        &self,
        worker_name: &str,
        phase: &str,
        deliverable: &serde_json::Value,
    ) -> DworkersResult<ReviewOutcome> {
        let cp = self.store.create(deliverable.clone(), worker_name, phase);
        info!(checkpoint = %cp.id, worker = %worker_name, "Waiting for checkpoint review");
        let resolved = self.store.wait_for_resolution(&cp.id, self.timeout).await?;
        Ok(match resolved.status {
            CheckpointStatus::Approved => ReviewOutcome::Approved,
            _ => ReviewOutcome::Rejected {
                reason: resolved.rejection_reason,
            },
        })
    }
}

/// Pick a reviewer for `mode`. A `timeout_secs` of 0 blocks without limit.
pub fn reviewer_for_mode(
    mode: ReviewMode,
    store: Arc<CheckpointStore>,
    timeout_secs: u64,
) -> Arc<dyn CheckpointHandler> {
    match mode {
        ReviewMode::Auto => Arc::new(AutoApproveReviewer),
        ReviewMode::Suspend => Arc::new(PendingReviewer::new(store)),
        ReviewMode::Block => {
            let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
            Arc::new(AwaitingReviewer::new(store, timeout))
        }
    }
}
