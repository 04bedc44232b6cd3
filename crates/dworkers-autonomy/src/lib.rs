//! Human-in-the-loop review for dworkers.
//!
//! - [`should_checkpoint`] decides whether a step's deliverable needs review.
//! - [`CheckpointStore`] holds review gates and their resolutions.
//! - Reviewers implement [`dworkers_core::CheckpointHandler`]:
//!   [`AutoApproveReviewer`], [`PendingReviewer`] (suspend) and
//!   [`AwaitingReviewer`] (block).

/// Checkpoints and their store.
pub mod checkpoint;
/// Autonomy levels and the review policy.
pub mod levels;
/// Review strategies.
pub mod reviewer;

pub use checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
pub use levels::{should_checkpoint, AutonomyConfig, SEMI_SUPERVISED_CHECKPOINTS};
pub use reviewer::{reviewer_for_mode, AutoApproveReviewer, AwaitingReviewer, PendingReviewer};
