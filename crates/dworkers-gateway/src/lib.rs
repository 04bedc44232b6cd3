//! HTTP surface over tenants, plans, runs, checkpoints, projects and
//! knowledge.
//!
//! [`GatewayServer::build`] turns a shared [`AppState`] into an axum
//! [`Router`](axum::Router). The same [`AppState`] backs the CLI, so a run
//! suspended over HTTP can be resumed from the command line and vice versa.

/// Error to HTTP response mapping.
pub mod error;
/// Request handlers.
pub mod routes;
/// Suspended run persistence.
pub mod runs;
/// Router construction and serving.
pub mod server;
/// Shared application state.
pub mod state;

pub use error::{ApiError, ApiResult};
pub use runs::{RunClaim, RunStore, StoredRun};
pub use server::GatewayServer;
pub use state::{AppState, RunOptions};
