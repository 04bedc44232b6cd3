//! Core types and error definitions for the dworkers platform.
//!
//! This crate provides the foundational types shared across all dworkers
//! crates: the error taxonomy, worker roles, autonomy levels, failure
//! strategies, the checkpoint review capability and process configuration.
//!
//! # Main types
//!
//! - [`DworkersError`]: Unified error enum for all dworkers subsystems.
//! - [`DworkersResult`]: Convenience alias for `Result<T, DworkersError>`.
//! - [`WorkerRole`]: The kind of digital worker bound to a plan step.
//! - [`AutonomyLevel`]: How often a worker pauses for review.
//! - [`FailureStrategy`]: How a pipeline reacts to a failed step.
//! - [`CheckpointHandler`]: Capability that reviews a worker's deliverable.
//! - [`DworkersConfig`]: Process-wide settings (TOML file + `DWORKERS_*` env).

/// Checkpoint review capability shared by the autonomy and orchestration crates.
pub mod checkpoint;
/// Process configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Shared enums.
pub mod types;

pub use checkpoint::{CheckpointHandler, ReviewOutcome};
pub use config::{DworkersConfig, ReviewMode, ServerConfig};
pub use error::{DworkersError, DworkersResult};
pub use types::{AutonomyLevel, FailureStrategy, WorkerRole};
