//! Digital workers: the capability the plan engine runs steps on.
//!
//! # Main types
//!
//! - [`Worker`]: Async task + context → [`WorkerOutput`], plus streaming.
//! - [`WorkerStream`]: Cancellable, single-consumer stream of [`StreamEvent`]s.
//! - [`ModelBackend`]: Abstract model provider; [`OfflineBackend`] is bundled.
//! - [`RoleWorker`]: The worker for the four consulting roles.
//! - [`WorkerFactory`]: Role → constructor, honouring tenant settings.
//! - [`WorkerRegistry`]: Name → live worker instance.

/// Model providers.
pub mod backend;
/// Role to constructor mapping.
pub mod factory;
/// Live worker lookup.
pub mod registry;
/// The role-based worker.
pub mod role;
/// Streaming output.
pub mod stream;
/// The worker contract.
pub mod worker;

pub use backend::{CompletionRequest, ModelBackend, OfflineBackend};
pub use factory::{WorkerConstructor, WorkerFactory};
pub use registry::WorkerRegistry;
pub use role::{model_purpose, role_preamble, RoleWorker};
pub use stream::{DeltaSink, StreamEvent, StreamMode, WorkerStream};
pub use worker::{TaskContext, Worker, WorkerOutput};
