use crate::graph::PlanGraph;
use crate::pipeline::{Pipeline, StepRuntime};
use crate::plan::Plan;
use dworkers_autonomy::AutoApproveReviewer;
use dworkers_core::{CheckpointHandler, DworkersConfig, DworkersResult};
use dworkers_tenants::TenantConfig;
use dworkers_workers::WorkerFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Turns a plan into a runnable [`Pipeline`] for one tenant.
///
/// Without an explicit factory the offline workers are used; without an
/// explicit reviewer every checkpoint is auto-approved.
pub struct PlanBuilder {
    plan: Arc<Plan>,
    tenant: Arc<TenantConfig>,
    factory: Option<Arc<WorkerFactory>>,
    config: DworkersConfig,
    reviewer: Option<Arc<dyn CheckpointHandler>>,
}

impl PlanBuilder {
    /// Builder for `plan` bound to `tenant`, with offline workers and default config.
    pub fn new(plan: Arc<Plan>, tenant: Arc<TenantConfig>) -> Self {
        Self {
            plan,
            tenant,
            factory: None,
            config: DworkersConfig::default(),
            reviewer: None,
        }
    }

    /// Use `factory` to create step workers.
    pub fn with_factory(mut self, factory: Arc<WorkerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Supplies the default autonomy, failure strategy and concurrency bound.
    pub fn with_config(mut self, config: DworkersConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `reviewer` for checkpoint gates.
    pub fn with_reviewer(mut self, reviewer: Arc<dyn CheckpointHandler>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Compile the graph only.
    pub fn build_graph(&self) -> DworkersResult<PlanGraph> {
        PlanGraph::compile(&self.plan)
    }

    /// Compile the graph and instantiate one worker per step.
    pub fn build(self) -> DworkersResult<Pipeline> {
        let graph = self.build_graph()?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(WorkerFactory::with_offline_workers()));

        let mut steps = HashMap::with_capacity(self.plan.steps.len());
        for step in &self.plan.steps {
            let name = format!("{}-{}", self.plan.name, step.step_id);
            let worker = factory.create(step.worker_role, &self.tenant, &name)?;
            let autonomy = self
                .tenant
                .worker_settings(step.worker_role)
                .autonomy
                .unwrap_or(self.config.default_autonomy);
            steps.insert(
                step.step_id.clone(),
                Arc::new(StepRuntime {
                    step: step.clone(),
                    worker,
                    autonomy,
                }),
            );
        }

        info!(
            plan = %self.plan.name,
            tenant = %self.tenant.id,
            steps = steps.len(),
            layers = graph.layers().len(),
            "Pipeline built"
        );

        let reviewer = self
            .reviewer
            .unwrap_or_else(|| Arc::new(AutoApproveReviewer) as Arc<dyn CheckpointHandler>);
        Ok(Pipeline::from_parts(
            self.plan,
            Arc::new(graph),
            self.tenant,
            steps,
            reviewer,
        )
        .with_strategy(self.config.default_failure_strategy)
        .with_max_concurrent(self.config.max_concurrent_workers))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use crate::templates::market_analysis_plan;
    use dworkers_core::{AutonomyLevel, DworkersError, FailureStrategy, WorkerRole};

    fn tenant() -> Arc<TenantConfig> {
        Arc::new(TenantConfig::new("acme", "Acme"))
    }

    #[test]
    fn test_build_names_workers_after_plan_and_step() {
        let pipeline = PlanBuilder::new(Arc::new(market_analysis_plan()), tenant())
            .build()
            .unwrap();
        let worker = pipeline.worker("define-scope").unwrap();
        assert_eq!(worker.name(), "market-analysis-define-scope");
        assert_eq!(worker.role(), WorkerRole::Analyst);
        assert_eq!(pipeline.strategy(), FailureStrategy::FailPipeline);
        assert_eq!(pipeline.max_concurrent(), 10);
    }

    #[test]
    fn test_step_autonomy_prefers_tenant_setting() {
        let mut tenant = TenantConfig::new("acme", "Acme");
        tenant.workers.manager.autonomy = Some(AutonomyLevel::Manual);
        let config = DworkersConfig {
            default_autonomy: AutonomyLevel::Autonomous,
            ..DworkersConfig::default()
        };
        let pipeline = PlanBuilder::new(Arc::new(market_analysis_plan()), Arc::new(tenant))
            .with_config(config)
            .build()
            .unwrap();
        assert_eq!(
            pipeline.step_autonomy("executive-review"),
            Some(AutonomyLevel::Manual)
        );
        assert_eq!(
            pipeline.step_autonomy("define-scope"),
            Some(AutonomyLevel::Autonomous)
        );
    }

    #[test]
    fn test_graph_errors_abort_build() {
        let plan = Plan::new("bad", "")
            .with_step(PlanStep::new("a", "A", WorkerRole::Analyst).depends_on(&["b"]))
            .with_step(PlanStep::new("b", "B", WorkerRole::Analyst).depends_on(&["a"]));
        let builder = PlanBuilder::new(Arc::new(plan), tenant());
        assert!(builder.build_graph().unwrap_err().is_graph_error());
        assert!(matches!(builder.build(), Err(DworkersError::Cycle { .. })));
    }

    #[test]
    fn test_disabled_role_fails_build() {
        let mut tenant = TenantConfig::new("acme", "Acme");
        tenant.workers.data_analyst.enabled = false;
        let err = PlanBuilder::new(Arc::new(market_analysis_plan()), Arc::new(tenant))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DworkersError::Config(_)));
    }
}
