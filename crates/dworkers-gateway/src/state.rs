use crate::runs::{RunStore, StoredRun};
use dworkers_autonomy::{reviewer_for_mode, Checkpoint, CheckpointStore};
use dworkers_core::{CheckpointHandler, DworkersConfig, DworkersResult, FailureStrategy};
use dworkers_orchestrator::{
    Pipeline, PipelineResult, PipelineStatus, PlanBuilder, PlanRegistry, WorkerMonitor,
};
use dworkers_knowledge::KnowledgeRegistry;
use dworkers_tenants::TenantRegistry;
use dworkers_workers::WorkerFactory;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-run overrides of the configured strategy and concurrency bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RunOptions {
    /// Failure strategy override.
    #[serde(default)]
    pub strategy: Option<FailureStrategy>,
    /// Concurrency bound override.
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

/// Registries and stores shared by every request.
///
/// With a data directory the checkpoint file may be shared with other
/// processes (the CLI resolving a checkpoint while `serve` runs). Every
/// checkpoint read or decision here merges the file first.
pub struct AppState {
    /// Process configuration.
    pub config: DworkersConfig,
    /// Registered tenants.
    pub tenants: Arc<TenantRegistry>,
    /// Registered plans.
    pub plans: Arc<PlanRegistry>,
    /// Worker constructors.
    pub factory: Arc<WorkerFactory>,
    /// Review gates.
    pub checkpoints: Arc<CheckpointStore>,
    /// Suspended runs.
    pub runs: Arc<RunStore>,
    /// Per-role execution metrics.
    pub monitor: Arc<WorkerMonitor>,
    /// Per-tenant document knowledge.
    pub knowledge: Arc<KnowledgeRegistry>,
    checkpoint_file: Option<PathBuf>,
}

impl AppState {
    /// In-memory state: built-in plan templates, offline workers, no tenants.
    pub fn new(config: DworkersConfig) -> Self {
        Self {
            config,
            tenants: Arc::new(TenantRegistry::new()),
            plans: Arc::new(PlanRegistry::with_templates()),
            factory: Arc::new(WorkerFactory::with_offline_workers()),
            checkpoints: Arc::new(CheckpointStore::new()),
            runs: Arc::new(RunStore::new()),
            monitor: Arc::new(WorkerMonitor::new()),
            knowledge: Arc::new(KnowledgeRegistry::new()),
            checkpoint_file: None,
        }
    }

    /// State backed by the configured directories: tenants are loaded from
    /// `tenant_config_dir`, checkpoints from `<data_dir>/checkpoints.json`,
    /// and suspended runs are kept under `<data_dir>/runs`.
    pub async fn from_config(config: DworkersConfig) -> DworkersResult<Self> {
        let checkpoint_file = config.data_dir.join("checkpoints.json");
        let runs = RunStore::with_dir(config.data_dir.join("runs"));
        let mut state = Self::new(config);
        state.runs = Arc::new(runs);

        let dir = &state.config.tenant_config_dir;
        if dir.is_dir() {
            let count = state.tenants.load_dir(dir)?;
            info!(count, dir = %dir.display(), "Tenants loaded");
        } else {
            warn!(dir = %dir.display(), "Tenant directory not found, no tenants loaded");
        }

        let count = state.checkpoints.load_from(&checkpoint_file).await?;
        if count > 0 {
            info!(count, path = %checkpoint_file.display(), "Checkpoints loaded");
        }
        state.checkpoint_file = Some(checkpoint_file);
        Ok(state)
    }

    /// Replace the worker factory.
    pub fn with_factory(mut self, factory: Arc<WorkerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// The reviewer selected by `review_mode`, bound to the shared store.
    pub fn reviewer(&self) -> Arc<dyn CheckpointHandler> {
        reviewer_for_mode(
            self.config.review_mode,
            Arc::clone(&self.checkpoints),
            self.config.review_timeout_secs,
        )
    }

    /// Build a pipeline for `plan_name` bound to `tenant_id`.
    pub fn pipeline(
        &self,
        plan_name: &str,
        tenant_id: &str,
        options: RunOptions,
    ) -> DworkersResult<Pipeline> {
        let plan = self.plans.get(plan_name)?;
        let tenant = self.tenants.get(tenant_id)?;
        let mut pipeline = PlanBuilder::new(plan, tenant)
            .with_factory(Arc::clone(&self.factory))
            .with_config(self.config.clone())
            .with_reviewer(self.reviewer())
            .build()?
            .with_monitor(Arc::clone(&self.monitor));
        if let Some(strategy) = options.strategy {
            pipeline = pipeline.with_strategy(strategy);
        }
        if let Some(max) = options.max_concurrent {
            pipeline = pipeline.with_max_concurrent(max);
        }
        Ok(pipeline)
    }

    /// Run a plan. A run that ends awaiting review is stored for resumption.
    pub async fn execute(
        &self,
        plan_name: &str,
        tenant_id: &str,
        inputs: serde_json::Map<String, Value>,
        options: RunOptions,
    ) -> DworkersResult<PipelineResult> {
        let pipeline = self.pipeline(plan_name, tenant_id, options)?;
        let result = pipeline.run(inputs).await?;
        if result.status == PipelineStatus::NeedsReview {
            self.store_run(tenant_id, &pipeline, &result).await?;
        }
        self.persist_checkpoints().await?;
        Ok(result)
    }

    /// Resume a stored run against the current checkpoint decisions. The
    /// stored entry is replaced by the new result.
    ///
    /// The run is claimed for the duration; a concurrent resume of the same
    /// run fails with `InvalidState`.
    pub async fn resume(&self, run_id: &str) -> DworkersResult<PipelineResult> {
        let (_claim, stored) = self.runs.claim(run_id).await?;
        self.refresh_checkpoints().await?;
        let options = RunOptions {
            strategy: Some(stored.strategy),
            max_concurrent: Some(stored.max_concurrent),
        };
        let pipeline = self.pipeline(&stored.result.pipeline, &stored.tenant_id, options)?;
        let result = pipeline.resume(&stored.result, &self.checkpoints).await?;
        self.store_run(&stored.tenant_id, &pipeline, &result).await?;
        self.persist_checkpoints().await?;
        Ok(result)
    }

    /// Pending checkpoints, including those created by other processes.
    pub async fn pending_checkpoints(&self) -> DworkersResult<Vec<Checkpoint>> {
        self.refresh_checkpoints().await?;
        Ok(self.checkpoints.list_pending())
    }

    /// Approve a checkpoint and persist the decision.
    pub async fn approve_checkpoint(&self, checkpoint_id: &str) -> DworkersResult<Checkpoint> {
        self.refresh_checkpoints().await?;
        let cp = self.checkpoints.approve(checkpoint_id)?;
        self.persist_checkpoints().await?;
        Ok(cp)
    }

    /// Reject a checkpoint with `reason` and persist the decision.
    pub async fn reject_checkpoint(
        &self,
        checkpoint_id: &str,
        reason: &str,
    ) -> DworkersResult<Checkpoint> {
        self.refresh_checkpoints().await?;
        let cp = self.checkpoints.reject(checkpoint_id, reason)?;
        self.persist_checkpoints().await?;
        Ok(cp)
    }

    /// Path of the shared checkpoint file, if any.
    pub fn checkpoint_file(&self) -> Option<&Path> {
        self.checkpoint_file.as_deref()
    }

    /// Merge decisions made by other processes from the checkpoint file.
    pub async fn refresh_checkpoints(&self) -> DworkersResult<()> {
        if let Some(path) = &self.checkpoint_file {
            self.checkpoints.load_from(path).await?;
        }
        Ok(())
    }

    /// Write the checkpoint store to disk when backed by a data directory.
    /// Decisions already on disk are kept.
    pub async fn persist_checkpoints(&self) -> DworkersResult<()> {
        if let Some(path) = &self.checkpoint_file {
            self.checkpoints.save_to(path).await?;
        }
        Ok(())
    }

    async fn store_run(
        &self,
        tenant_id: &str,
        pipeline: &Pipeline,
        result: &PipelineResult,
    ) -> DworkersResult<()> {
        self.runs
            .save(StoredRun {
                tenant_id: tenant_id.to_string(),
                strategy: pipeline.strategy(),
                max_concurrent: pipeline.max_concurrent(),
                result: result.clone(),
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dworkers_core::{DworkersError, ReviewMode};
    use dworkers_orchestrator::NodeStatus;
    use dworkers_tenants::TenantConfig;
    use serde_json::json;

    fn suspend_state() -> AppState {
        let config = DworkersConfig {
            review_mode: ReviewMode::Suspend,
            ..DworkersConfig::default()
        };
        let state = AppState::new(config);
        state.tenants.register(TenantConfig::new("acme", "Acme"));
        state
    }

    #[tokio::test]
    async fn test_execute_stores_suspended_run() {
        let state = suspend_state();
        let inputs = json!({"client": "Globex"}).as_object().cloned().unwrap();
        let result = state
            .execute("market-analysis", "acme", inputs, RunOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, PipelineStatus::NeedsReview);
        let stored = state.runs.get(&result.run_id).await.unwrap();
        assert_eq!(stored.tenant_id, "acme");
        assert_eq!(stored.result, result);
        assert_eq!(state.checkpoints.list_pending().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_tenant() {
        let state = suspend_state();
        let err = state
            .execute(
                "market-analysis",
                "nobody",
                serde_json::Map::new(),
                RunOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DworkersError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn test_resume_until_complete() {
        let state = suspend_state();
        let mut result = state
            .execute(
                "technology-assessment",
                "acme",
                serde_json::Map::new(),
                RunOptions::default(),
            )
            .await
            .unwrap();
        // Every gated step suspends once; approve each in turn.
        while result.status == PipelineStatus::NeedsReview {
            for cp in state.checkpoints.list_pending() {
                state.approve_checkpoint(&cp.id).await.unwrap();
            }
            result = state.resume(&result.run_id).await.unwrap();
        }
        assert_eq!(result.status, PipelineStatus::Completed);
        let stored = state.runs.get(&result.run_id).await.unwrap();
        assert_eq!(stored.result.status, PipelineStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_resume_runs_once() {
        let state = suspend_state();
        let result = state
            .execute(
                "market-analysis",
                "acme",
                serde_json::Map::new(),
                RunOptions::default(),
            )
            .await
            .unwrap();
        for cp in state.checkpoints.list_pending() {
            state.approve_checkpoint(&cp.id).await.unwrap();
        }

        let (first, second) = tokio::join!(
            state.resume(&result.run_id),
            state.resume(&result.run_id)
        );
        let (ok, err): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(Result::is_ok);
        assert_eq!(ok.len(), 1);
        assert!(matches!(
            err.into_iter().next().unwrap(),
            Err(DworkersError::InvalidState(_))
        ));
        assert_eq!(state.checkpoints.list_pending().len(), 1);

        // The hold is released once the winner finishes.
        let again = state.resume(&result.run_id).await.unwrap();
        assert_eq!(again.status, PipelineStatus::NeedsReview);
        assert_eq!(state.checkpoints.list_pending().len(), 1);
    }

    fn shared_config(tmp: &std::path::Path) -> DworkersConfig {
        let tenants = tmp.join("tenants");
        std::fs::create_dir_all(&tenants).unwrap();
        std::fs::write(tenants.join("acme.toml"), "id = \"acme\"\nname = \"Acme\"\n").unwrap();
        DworkersConfig {
            tenant_config_dir: tenants,
            data_dir: tmp.join("data"),
            review_mode: ReviewMode::Suspend,
            ..DworkersConfig::default()
        }
    }

    #[tokio::test]
    async fn test_decision_from_another_process_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let config = shared_config(tmp.path());

        let server = AppState::from_config(config.clone()).await.unwrap();
        let result = server
            .execute(
                "process-improvement",
                "acme",
                serde_json::Map::new(),
                RunOptions::default(),
            )
            .await
            .unwrap();
        let cp = server.pending_checkpoints().await.unwrap().remove(0);
        let gated = awaiting_step(&result);

        let cli = AppState::from_config(config.clone()).await.unwrap();
        cli.approve_checkpoint(&cp.id).await.unwrap();

        // The server has not seen the approval yet.
        assert!(server.checkpoints.is_pending(&cp.id));
        let err = server.approve_checkpoint(&cp.id).await.unwrap_err();
        assert!(matches!(err, DworkersError::InvalidState(_)));

        let resumed = server.resume(&result.run_id).await.unwrap();
        assert_eq!(resumed.node(&gated).unwrap().status, NodeStatus::Success);

        let fresh = AppState::from_config(config).await.unwrap();
        assert!(fresh.checkpoints.is_approved(&cp.id));
    }

    #[tokio::test]
    async fn test_pending_checkpoints_include_other_processes() {
        let tmp = tempfile::tempdir().unwrap();
        let config = shared_config(tmp.path());
        let server = AppState::from_config(config.clone()).await.unwrap();
        assert!(server.pending_checkpoints().await.unwrap().is_empty());

        let cli = AppState::from_config(config).await.unwrap();
        cli.execute(
            "process-improvement",
            "acme",
            serde_json::Map::new(),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(server.pending_checkpoints().await.unwrap().len(), 1);
    }

    fn awaiting_step(result: &PipelineResult) -> String {
        result
            .nodes
            .iter()
            .find(|(_, node)| node.status == NodeStatus::AwaitingReview)
            .map(|(id, _)| id.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn test_from_config_persists_checkpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let tenants = tmp.path().join("tenants");
        std::fs::create_dir_all(&tenants).unwrap();
        std::fs::write(tenants.join("acme.toml"), "id = \"acme\"\nname = \"Acme\"\n").unwrap();
        let config = DworkersConfig {
            tenant_config_dir: tenants,
            data_dir: tmp.path().join("data"),
            review_mode: ReviewMode::Suspend,
            ..DworkersConfig::default()
        };

        let state = AppState::from_config(config.clone()).await.unwrap();
        assert_eq!(state.tenants.list(), vec!["acme"]);
        let result = state
            .execute(
                "process-improvement",
                "acme",
                serde_json::Map::new(),
                RunOptions::default(),
            )
            .await
            .unwrap();
        assert!(tmp.path().join("data/checkpoints.json").exists());

        let reopened = AppState::from_config(config).await.unwrap();
        assert_eq!(reopened.checkpoints.list_pending().len(), 1);
        let stored = reopened.runs.get(&result.run_id).await.unwrap();
        assert_eq!(stored.result.run_id, result.run_id);
    }
}
