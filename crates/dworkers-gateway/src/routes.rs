use crate::error::ApiResult;
use crate::state::{AppState, RunOptions};
use async_stream::stream;
use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use dworkers_autonomy::Checkpoint;
use dworkers_core::WorkerRole;
use dworkers_knowledge::indexer::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use dworkers_knowledge::{DocumentChunk, DocumentIndexer};
use dworkers_orchestrator::{
    PipelineResult, PlanGraph, ProjectOrchestrator, ProjectResult,
};
use dworkers_tenants::TenantConfig;
use dworkers_workers::TaskContext;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

type Shared = State<Arc<AppState>>;

fn default_tenant() -> String {
    "default".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_max_results() -> usize {
    5
}

/// Body of `POST /api/plans/execute`.
#[derive(Debug, Deserialize)]
pub struct ExecutePlanRequest {
    /// Registered plan name.
    pub plan_name: String,
    /// Tenant to run for; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Pipeline inputs.
    #[serde(default)]
    pub inputs: serde_json::Map<String, Value>,
    /// Strategy and concurrency overrides, inline.
    #[serde(flatten)]
    pub options: RunOptions,
}

/// Optional body of `POST /api/checkpoints/{id}/reject`.
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    /// Recorded rejection reason.
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /api/workers/run`.
#[derive(Debug, Deserialize)]
pub struct RunWorkerRequest {
    /// Role name, e.g. `researcher`.
    pub worker_role: String,
    /// Task text.
    pub prompt: String,
    /// Tenant to run for; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Extra context rendered into the prompt.
    #[serde(default)]
    pub context: TaskContext,
}

/// Body of `POST /api/projects/run` and `/api/projects/run/sync`.
#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    /// Free-form project brief.
    pub brief: String,
    /// Tenant to run for; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Project id; a UUID is generated when missing or empty.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Body of `POST /api/knowledge/index`.
#[derive(Debug, Deserialize)]
pub struct IndexDocumentRequest {
    /// Document origin, used in chunk ids.
    pub source: String,
    /// Raw text.
    pub content: String,
    /// Owning tenant; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Copied onto every chunk.
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    /// Characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Body of `POST /api/knowledge/search`.
#[derive(Debug, Deserialize)]
pub struct SearchKnowledgeRequest {
    /// Case-insensitive substring to look for.
    pub query: String,
    /// Tenant whose documents are searched; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    /// Result cap.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

/// Query string of `GET /api/knowledge/sources`.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    /// Tenant id; `"default"` when omitted.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

/// Liveness check.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": "dworkers"}))
}

/// Registered tenant ids.
pub async fn list_tenants(State(state): Shared) -> Json<Vec<String>> {
    Json(state.tenants.list())
}

/// One tenant config.
pub async fn get_tenant(
    State(state): Shared,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantConfig>> {
    let tenant = state.tenants.get(&tenant_id)?;
    Ok(Json(TenantConfig::clone(&tenant)))
}

/// Registered plan names.
pub async fn list_plans(State(state): Shared) -> Json<Vec<String>> {
    Json(state.plans.list())
}

/// Plan steps plus the execution layers of its graph.
pub async fn get_plan(State(state): Shared, Path(name): Path<String>) -> ApiResult<Json<Value>> {
    let plan = state.plans.get(&name)?;
    let graph = PlanGraph::compile(&plan)?;
    Ok(Json(json!({
        "name": plan.name,
        "description": plan.description,
        "steps": plan.steps,
        "layers": graph.layers(),
    })))
}

/// Run a plan to completion or suspension.
pub async fn execute_plan(
    State(state): Shared,
    Json(req): Json<ExecutePlanRequest>,
) -> ApiResult<Json<PipelineResult>> {
    info!(plan = %req.plan_name, tenant = %req.tenant_id, "Plan execution requested");
    let result = state
        .execute(&req.plan_name, &req.tenant_id, req.inputs, req.options)
        .await?;
    Ok(Json(result))
}

/// Latest stored result of a run.
pub async fn get_run(
    State(state): Shared,
    Path(run_id): Path<String>,
) -> ApiResult<Json<PipelineResult>> {
    Ok(Json(state.runs.get(&run_id).await?.result))
}

/// Resume a suspended run.
pub async fn resume_run(
    State(state): Shared,
    Path(run_id): Path<String>,
) -> ApiResult<Json<PipelineResult>> {
    Ok(Json(state.resume(&run_id).await?))
}

/// Pending checkpoints, oldest first.
pub async fn list_checkpoints(State(state): Shared) -> ApiResult<Json<Vec<Checkpoint>>> {
    Ok(Json(state.pending_checkpoints().await?))
}

/// Approve a pending checkpoint.
pub async fn approve_checkpoint(
    State(state): Shared,
    Path(checkpoint_id): Path<String>,
) -> ApiResult<Json<Checkpoint>> {
    Ok(Json(state.approve_checkpoint(&checkpoint_id).await?))
}

/// Reject a pending checkpoint. The body is optional; a missing reason is
/// recorded as empty.
pub async fn reject_checkpoint(
    State(state): Shared,
    Path(checkpoint_id): Path<String>,
    body: Option<Json<RejectRequest>>,
) -> ApiResult<Json<Checkpoint>> {
    let reason = body.map(|Json(req)| req.reason).unwrap_or_default();
    Ok(Json(state.reject_checkpoint(&checkpoint_id, &reason).await?))
}

/// Roles the factory can build.
pub async fn list_workers(State(state): Shared) -> Json<Vec<WorkerRole>> {
    Json(state.factory.roles())
}

/// Run one worker outside any plan.
pub async fn run_worker(
    State(state): Shared,
    Json(req): Json<RunWorkerRequest>,
) -> ApiResult<Json<Value>> {
    let role: WorkerRole = req.worker_role.parse()?;
    let tenant = state.tenants.get(&req.tenant_id)?;
    let worker = state
        .factory
        .create(role, &tenant, &format!("{}-{role}", tenant.id))?;
    let output = worker.run(&req.prompt, &req.context).await?;
    Ok(Json(json!({
        "worker_name": worker.name(),
        "role": role,
        "success": output.success,
        "output": output.output,
        "error": output.error,
    })))
}

fn project_id_for(requested: Option<String>) -> String {
    requested
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn project_body(project_id: &str, result: &ProjectResult) -> Value {
    json!({
        "project_id": project_id,
        "success": result.success,
        "deliverables": result.deliverables,
        "duration_ms": result.duration_ms,
    })
}

fn sse_event(name: &str, payload: &impl Serialize) -> Event {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(name).data(data)
}

/// Run a project brief, streaming progress as server-sent events.
///
/// The stream opens with `project_started`, carries one `pipeline` event per
/// [`dworkers_orchestrator::PipelineEvent`] and ends with
/// `project_completed` (or `error` if the run task dies). An unknown tenant
/// is a plain 404 before the stream starts.
pub async fn run_project_stream(
    State(state): Shared,
    Json(req): Json<ProjectRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let tenant = state.tenants.get(&req.tenant_id)?;
    let project_id = project_id_for(req.project_id);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = ProjectOrchestrator::new(tenant, &project_id)
        .with_factory(Arc::clone(&state.factory))
        .with_config(state.config.clone())
        .with_events(tx);
    let brief = req.brief;
    let run = tokio::spawn(async move { orchestrator.run(&brief).await });
    info!(project = %project_id, tenant = %req.tenant_id, "Project stream started");

    let events = stream! {
        yield Ok(sse_event("project_started", &json!({ "project_id": project_id })));
        while let Some(event) = rx.recv().await {
            yield Ok(sse_event("pipeline", &event));
        }
        match run.await {
            Ok(result) => {
                yield Ok(sse_event("project_completed", &project_body(&project_id, &result)));
            }
            Err(e) => {
                warn!(project = %project_id, error = %e, "Project task failed");
                yield Ok(sse_event(
                    "error",
                    &json!({ "project_id": project_id, "error": e.to_string() }),
                ));
            }
        }
    };
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Run a project brief and return the result in one response.
pub async fn run_project(
    State(state): Shared,
    Json(req): Json<ProjectRequest>,
) -> ApiResult<Json<Value>> {
    let tenant = state.tenants.get(&req.tenant_id)?;
    let project_id = project_id_for(req.project_id);
    let result = ProjectOrchestrator::new(tenant, &project_id)
        .with_factory(Arc::clone(&state.factory))
        .with_config(state.config.clone())
        .run(&req.brief)
        .await;
    Ok(Json(project_body(&project_id, &result)))
}

/// Split a document into chunks and index them for the tenant.
pub async fn index_document(
    State(state): Shared,
    Json(req): Json<IndexDocumentRequest>,
) -> ApiResult<Json<Value>> {
    state.tenants.get(&req.tenant_id)?;
    let indexer = DocumentIndexer::new(req.chunk_size, req.chunk_overlap)?;
    let repository = state.knowledge.repository(&req.tenant_id);
    let chunk_ids = indexer.index_text(&repository, &req.source, &req.content, &req.metadata);
    Ok(Json(json!({ "source": req.source, "chunk_ids": chunk_ids })))
}

/// Search the tenant's indexed documents.
pub async fn search_knowledge(
    State(state): Shared,
    Json(req): Json<SearchKnowledgeRequest>,
) -> ApiResult<Json<Value>> {
    state.tenants.get(&req.tenant_id)?;
    let results: Vec<DocumentChunk> = state
        .knowledge
        .get(&req.tenant_id)
        .map(|repo| repo.search(&req.query, req.max_results))
        .unwrap_or_default();
    Ok(Json(json!({ "query": req.query, "results": results })))
}

/// Sources indexed for a tenant.
pub async fn knowledge_sources(
    State(state): Shared,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Value>> {
    state.tenants.get(&query.tenant_id)?;
    let sources = state
        .knowledge
        .get(&query.tenant_id)
        .map(|repo| repo.list_sources())
        .unwrap_or_default();
    Ok(Json(json!({ "tenant_id": query.tenant_id, "sources": sources })))
}

/// Worker monitor snapshot.
pub async fn monitor(State(state): Shared) -> Json<Value> {
    Json(state.monitor.to_json().await)
}
