use crate::routes;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use dworkers_core::DworkersResult;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    /// Build the router over `state`.
    pub fn build(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/api/tenants", get(routes::list_tenants))
            .route("/api/tenants/{id}", get(routes::get_tenant))
            .route("/api/plans", get(routes::list_plans))
            .route("/api/plans/execute", post(routes::execute_plan))
            .route("/api/plans/{name}", get(routes::get_plan))
            .route("/api/runs/{run_id}", get(routes::get_run))
            .route("/api/runs/{run_id}/resume", post(routes::resume_run))
            .route("/api/checkpoints", get(routes::list_checkpoints))
            .route(
                "/api/checkpoints/{id}/approve",
                post(routes::approve_checkpoint),
            )
            .route("/api/checkpoints/{id}/reject", post(routes::reject_checkpoint))
            .route("/api/workers", get(routes::list_workers))
            .route("/api/workers/run", post(routes::run_worker))
            .route("/api/projects/run", post(routes::run_project_stream))
            .route("/api/projects/run/sync", post(routes::run_project))
            .route("/api/knowledge/index", post(routes::index_document))
            .route("/api/knowledge/search", post(routes::search_knowledge))
            .route("/api/knowledge/sources", get(routes::knowledge_sources))
            .route("/api/monitor", get(routes::monitor))
            .with_state(state)
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        listener: TcpListener,
        state: Arc<AppState>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> DworkersResult<()> {
        info!(addr = %listener.local_addr()?, "Gateway listening");
        axum::serve(listener, Self::build(state))
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Gateway stopped");
        Ok(())
    }
}
