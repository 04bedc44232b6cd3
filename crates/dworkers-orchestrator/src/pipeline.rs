use crate::events::PipelineEvent;
use crate::graph::PlanGraph;
use crate::monitor::WorkerMonitor;
use crate::plan::{InputMapping, Plan, PlanStep};
use crate::types::{
    NodeError, NodeErrorKind, NodeResult, NodeStatus, PipelineResult, PipelineStatus,
};
use dworkers_autonomy::{should_checkpoint, CheckpointStatus, CheckpointStore};
use dworkers_core::{
    AutonomyLevel, CheckpointHandler, DworkersError, DworkersResult, FailureStrategy,
    ReviewOutcome,
};
use dworkers_tenants::TenantConfig;
use dworkers_workers::{TaskContext, Worker};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const HALTED: &str = "pipeline halted";

/// A step bound to its worker and resolved autonomy.
pub(crate) struct StepRuntime {
    pub(crate) step: PlanStep,
    pub(crate) worker: Arc<dyn Worker>,
    pub(crate) autonomy: AutonomyLevel,
}

/// A compiled plan, ready to run any number of times.
///
/// Built by [`crate::PlanBuilder`]. Each run has its own node state; the
/// pipeline itself is never mutated by running it.
pub struct Pipeline {
    plan: Arc<Plan>,
    graph: Arc<PlanGraph>,
    tenant: Arc<TenantConfig>,
    steps: HashMap<String, Arc<StepRuntime>>,
    reviewer: Arc<dyn CheckpointHandler>,
    strategy: FailureStrategy,
    max_concurrent: usize,
    events: Option<UnboundedSender<PipelineEvent>>,
    monitor: Option<Arc<WorkerMonitor>>,
}

impl Pipeline {
    pub(crate) fn from_parts(
        plan: Arc<Plan>,
        graph: Arc<PlanGraph>,
        tenant: Arc<TenantConfig>,
        steps: HashMap<String, Arc<StepRuntime>>,
        reviewer: Arc<dyn CheckpointHandler>,
    ) -> Self {
        Self {
            plan,
            graph,
            tenant,
            steps,
            reviewer,
            strategy: FailureStrategy::default(),
            max_concurrent: 10,
            events: None,
            monitor: None,
        }
    }

    /// Override the failure strategy.
    pub fn with_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bound on steps in flight at once. Values below 1 are raised to 1.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Send progress events to `tx`. A closed receiver is ignored.
    pub fn with_events(mut self, tx: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Report step activity to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<WorkerMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Replace the checkpoint reviewer.
    pub fn with_reviewer(mut self, reviewer: Arc<dyn CheckpointHandler>) -> Self {
        self.reviewer = reviewer;
        self
    }

    /// The plan being run.
    pub fn plan(&self) -> &Arc<Plan> {
        &self.plan
    }

    /// The compiled graph.
    pub fn graph(&self) -> &PlanGraph {
        &self.graph
    }

    /// The tenant the workers were built for.
    pub fn tenant(&self) -> &Arc<TenantConfig> {
        &self.tenant
    }

    /// Failure strategy in effect.
    pub fn strategy(&self) -> FailureStrategy {
        self.strategy
    }

    /// Concurrency bound in effect.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Worker bound to `step_id`.
    pub fn worker(&self, step_id: &str) -> Option<Arc<dyn Worker>> {
        self.steps.get(step_id).map(|s| Arc::clone(&s.worker))
    }

    /// Autonomy level resolved for `step_id`.
    pub fn step_autonomy(&self, step_id: &str) -> Option<AutonomyLevel> {
        self.steps.get(step_id).map(|s| s.autonomy)
    }

    /// Run every step with `inputs`. See [`Pipeline::run_with_cancel`].
    pub async fn run(
        &self,
        inputs: serde_json::Map<String, Value>,
    ) -> DworkersResult<PipelineResult> {
        self.run_with_cancel(inputs, CancellationToken::new()).await
    }

    /// Run to completion, suspension or cancellation of `cancel`.
    pub async fn run_with_cancel(
        &self,
        inputs: serde_json::Map<String, Value>,
        cancel: CancellationToken,
    ) -> DworkersResult<PipelineResult> {
        let run = RunState::new(&self.graph);
        self.execute(Uuid::new_v4().to_string(), inputs, run, cancel)
            .await
    }

    /// Continue a `needs_review` run once its checkpoints have been decided.
    ///
    /// Approved checkpoints complete their step with the stored deliverable,
    /// rejected ones fail it, and still-pending ones keep it parked.
    pub async fn resume(
        &self,
        previous: &PipelineResult,
        store: &CheckpointStore,
    ) -> DworkersResult<PipelineResult> {
        self.resume_with_cancel(previous, store, CancellationToken::new())
            .await
    }

    /// [`Pipeline::resume`] that stops early when `cancel` fires.
    pub async fn resume_with_cancel(
        &self,
        previous: &PipelineResult,
        store: &CheckpointStore,
        cancel: CancellationToken,
    ) -> DworkersResult<PipelineResult> {
        if previous.pipeline != self.plan.name {
            return Err(DworkersError::InvalidState(format!(
                "Run '{}' belongs to pipeline '{}', not '{}'",
                previous.run_id, previous.pipeline, self.plan.name
            )));
        }
        if previous.status != PipelineStatus::NeedsReview {
            return Err(DworkersError::InvalidState(format!(
                "Run '{}' is {}, only needs_review runs can be resumed",
                previous.run_id, previous.status
            )));
        }

        let mut run = RunState::new(&self.graph);
        for (id, node) in &previous.nodes {
            if !self.graph.contains(id) {
                return Err(DworkersError::InvalidState(format!(
                    "Run '{}' has unknown step '{id}'",
                    previous.run_id
                )));
            }
            run.nodes.insert(id.clone(), node.clone());
        }
        if let (Some(step), Some(error)) = (&previous.failed_node, &previous.error) {
            run.failure = Some((step.clone(), error.clone()));
        }

        let mut decided = Vec::new();
        for id in previous.awaiting_review() {
            let checkpoint_id = previous.nodes[id].checkpoint_id.clone().ok_or_else(|| {
                DworkersError::InvalidState(format!("Step '{id}' awaits review without a checkpoint"))
            })?;
            let cp = store
                .get(&checkpoint_id)
                .ok_or_else(|| DworkersError::CheckpointNotFound(checkpoint_id.clone()))?;
            let previous_node = &previous.nodes[id];
            let node = match cp.status {
                CheckpointStatus::Pending => continue,
                CheckpointStatus::Approved => NodeResult::succeeded(cp.deliverable),
                CheckpointStatus::Rejected => {
                    NodeResult::failed(NodeErrorKind::CheckpointRejected, cp.rejection_reason)
                }
            };
            run.nodes.insert(
                id.to_string(),
                NodeResult {
                    attempts: previous_node.attempts,
                    duration_ms: previous_node.duration_ms,
                    checkpoint_id: Some(checkpoint_id),
                    ..node
                },
            );
            decided.push(id.to_string());
        }

        info!(
            run_id = %previous.run_id,
            pipeline = %self.plan.name,
            decided = decided.len(),
            "Resuming pipeline run"
        );
        for id in &decided {
            self.record_outcome(&mut run, id);
        }
        self.execute(previous.run_id.clone(), previous.inputs.clone(), run, cancel)
            .await
    }

    async fn execute(
        &self,
        run_id: String,
        inputs: serde_json::Map<String, Value>,
        mut run: RunState,
        cancel: CancellationToken,
    ) -> DworkersResult<PipelineResult> {
        let start = Instant::now();
        let inputs = Arc::new(inputs);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<(String, NodeResult)> = JoinSet::new();
        let mut cancelled = false;

        info!(
            run_id = %run_id,
            pipeline = %self.plan.name,
            tenant = %self.tenant.id,
            strategy = %self.strategy,
            "Pipeline run started"
        );
        self.emit(PipelineEvent::RunStarted {
            run_id: run_id.clone(),
            pipeline: self.plan.name.clone(),
            steps: self.graph.len(),
        });

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            if !run.halted {
                for step_id in self.ready_steps(&mut run) {
                    let permit = Arc::clone(&semaphore).try_acquire_owned().map_err(|_| {
                        DworkersError::ConcurrencyLimitExceeded {
                            limit: self.max_concurrent,
                        }
                    })?;
                    let runtime = Arc::clone(&self.steps[&step_id]);
                    let context = self.build_context(&runtime.step, &inputs, &run);
                    let prompt = render_prompt(&runtime.step, &context);
                    let task = StepTask {
                        runtime,
                        prompt,
                        context,
                        reviewer: Arc::clone(&self.reviewer),
                        events: self.events.clone(),
                        monitor: self.monitor.clone(),
                    };
                    run.running.insert(step_id.clone());
                    tasks.spawn(async move {
                        let _permit = permit;
                        let result = task.run().await;
                        (step_id, result)
                    });
                }
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    break;
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (step_id, node) = joined.map_err(|e| {
                        DworkersError::InvalidState(format!("Step task ended abnormally: {e}"))
                    })?;
                    run.running.remove(&step_id);
                    run.nodes.insert(step_id.clone(), node);
                    self.record_outcome(&mut run, &step_id);
                }
            }
        }

        let status = self.finish(&mut run, cancelled);
        let duration_ms = start.elapsed().as_millis() as u64;
        let final_output = (status == PipelineStatus::Completed).then(|| self.final_output(&run));
        let (failed_node, error) = match (status, run.failure) {
            (PipelineStatus::Cancelled, _) => (None, Some("run cancelled".to_string())),
            (_, Some((step, message))) => (Some(step), Some(message)),
            (_, None) => (None, None),
        };

        info!(
            run_id = %run_id,
            pipeline = %self.plan.name,
            status = %status,
            duration_ms,
            "Pipeline run finished"
        );
        self.emit(PipelineEvent::RunFinished {
            run_id: run_id.clone(),
            status,
            duration_ms,
        });

        Ok(PipelineResult {
            run_id,
            pipeline: self.plan.name.clone(),
            status,
            success: status == PipelineStatus::Completed,
            duration_ms,
            nodes: run.nodes,
            final_output,
            failed_node,
            error,
            inputs: Arc::unwrap_or_clone(inputs),
        })
    }

    /// Pending steps whose dependencies are all terminal, in declaration
    /// order, up to the free concurrency. Steps whose upstream can no longer
    /// feed them are skipped on the way.
    fn ready_steps(&self, run: &mut RunState) -> Vec<String> {
        let mut ready = Vec::new();
        let mut changed = true;
        while changed {
            changed = false;
            for step_id in self.graph.step_ids() {
                if run.status(step_id) != NodeStatus::Pending
                    || run.running.contains(step_id)
                    || ready.contains(step_id)
                {
                    continue;
                }
                let mut waiting = false;
                let mut blocker = None;
                for dep in self.graph.dependencies(step_id) {
                    match run.status(dep) {
                        NodeStatus::Success => {}
                        NodeStatus::Failed if self.strategy == FailureStrategy::Ignore => {}
                        NodeStatus::Failed | NodeStatus::Skipped | NodeStatus::Cancelled => {
                            blocker.get_or_insert(dep);
                        }
                        NodeStatus::Pending | NodeStatus::AwaitingReview => waiting = true,
                    }
                }
                if waiting {
                    continue;
                }
                if let Some(dep) = blocker {
                    let reason = format!("upstream '{dep}' did not succeed");
                    self.skip(run, step_id, reason);
                    changed = true;
                } else if run.running.len() + ready.len() < self.max_concurrent {
                    ready.push(step_id.clone());
                }
            }
        }
        ready
    }

    /// Report a settled step and apply the failure strategy.
    fn record_outcome(&self, run: &mut RunState, step_id: &str) {
        let Some(node) = run.nodes.get(step_id).cloned() else {
            return;
        };
        match node.status {
            NodeStatus::Success => {
                self.emit(PipelineEvent::StepCompleted {
                    step_id: step_id.to_string(),
                    duration_ms: node.duration_ms,
                });
            }
            NodeStatus::AwaitingReview => {
                let checkpoint_id = node.checkpoint_id.unwrap_or_default();
                info!(step = %step_id, checkpoint = %checkpoint_id, "Step awaiting review");
                self.emit(PipelineEvent::StepAwaitingReview {
                    step_id: step_id.to_string(),
                    checkpoint_id,
                });
            }
            NodeStatus::Failed => {
                let error = node.error.unwrap_or_else(|| {
                    NodeError::new(NodeErrorKind::StepExecution, "unknown failure")
                });
                warn!(
                    step = %step_id,
                    kind = ?error.kind,
                    error = %error.message,
                    strategy = %self.strategy,
                    "Step failed"
                );
                self.emit(PipelineEvent::StepFailed {
                    step_id: step_id.to_string(),
                    error: error.clone(),
                });
                match self.strategy {
                    FailureStrategy::Ignore => return,
                    FailureStrategy::SkipDownstream => {
                        for dependent in self.graph.transitive_dependents(step_id) {
                            if run.status(&dependent) == NodeStatus::Pending {
                                self.skip(run, &dependent, format!("upstream '{step_id}' failed"));
                            }
                        }
                    }
                    FailureStrategy::FailPipeline => run.halted = true,
                }
                if run.failure.is_none() {
                    run.failure = Some((step_id.to_string(), error.message));
                }
            }
            NodeStatus::Pending | NodeStatus::Skipped | NodeStatus::Cancelled => {}
        }
    }

    fn skip(&self, run: &mut RunState, step_id: &str, reason: String) {
        info!(step = %step_id, reason = %reason, "Step skipped");
        self.emit(PipelineEvent::StepSkipped {
            step_id: step_id.to_string(),
            reason: reason.clone(),
        });
        run.nodes
            .insert(step_id.to_string(), NodeResult::skipped(reason));
    }

    /// Settle never-started steps and pick the run status.
    fn finish(&self, run: &mut RunState, cancelled: bool) -> PipelineStatus {
        let pending: Vec<String> = self
            .graph
            .step_ids()
            .iter()
            .filter(|id| run.status(id) == NodeStatus::Pending)
            .cloned()
            .collect();

        if cancelled {
            for id in run.running.drain().chain(pending) {
                run.nodes.insert(id, NodeResult::cancelled());
            }
            return PipelineStatus::Cancelled;
        }
        if run.halted {
            for id in pending {
                self.skip(run, &id, HALTED.to_string());
            }
            return PipelineStatus::Failed;
        }
        if run
            .nodes
            .values()
            .any(|n| n.status == NodeStatus::AwaitingReview)
        {
            return PipelineStatus::NeedsReview;
        }
        if run.failure.is_some() {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Completed
        }
    }

    /// A single sink yields its output; several yield an object keyed by
    /// sink id with `null` where a sink produced nothing.
    fn final_output(&self, run: &RunState) -> Value {
        let output = |id: &str| {
            run.nodes
                .get(id)
                .and_then(|n| n.output.clone())
                .unwrap_or(Value::Null)
        };
        match self.graph.sinks() {
            [only] => output(only),
            sinks => {
                let mut ids: Vec<&String> = sinks.iter().collect();
                ids.sort();
                Value::Object(ids.into_iter().map(|id| (id.clone(), output(id))).collect())
            }
        }
    }

    /// Inputs and direct upstream outputs for `step`, per its mapping.
    /// Upstream outputs are keyed by step id and win over same-named inputs.
    fn build_context(
        &self,
        step: &PlanStep,
        inputs: &serde_json::Map<String, Value>,
        run: &RunState,
    ) -> TaskContext {
        let upstream = |id: &str| {
            run.nodes
                .get(id)
                .and_then(|n| n.output.clone())
                .unwrap_or(Value::Null)
        };
        let mut context = TaskContext::new();
        match &step.input_mapping {
            InputMapping::All => {
                context.extend(inputs.iter().map(|(k, v)| (k.clone(), v.clone())));
                for dep in self.graph.dependencies(&step.step_id) {
                    context.insert(dep.clone(), upstream(dep));
                }
            }
            InputMapping::UpstreamOnly => {
                for dep in self.graph.dependencies(&step.step_id) {
                    context.insert(dep.clone(), upstream(dep));
                }
            }
            InputMapping::Select {
                inputs: names,
                upstream: deps,
            } => {
                for name in names {
                    if let Some(value) = inputs.get(name) {
                        context.insert(name.clone(), value.clone());
                    }
                }
                for dep in deps {
                    context.insert(dep.clone(), upstream(dep));
                }
            }
        }
        context
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Fill `{key}` placeholders from `context`; without a template the step
/// description is the prompt. Unknown placeholders are left as written.
pub fn render_prompt(step: &PlanStep, context: &TaskContext) -> String {
    let Some(template) = &step.prompt_template else {
        return step.description.clone();
    };
    let mut prompt = template.clone();
    for (key, value) in context {
        let placeholder = format!("{{{key}}}");
        if prompt.contains(&placeholder) {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            prompt = prompt.replace(&placeholder, &text);
        }
    }
    prompt
}

/// Node state owned by the coordinator for one run.
struct RunState {
    nodes: BTreeMap<String, NodeResult>,
    running: HashSet<String>,
    halted: bool,
    failure: Option<(String, String)>,
}

impl RunState {
    fn new(graph: &PlanGraph) -> Self {
        Self {
            nodes: graph
                .step_ids()
                .iter()
                .map(|id| (id.clone(), NodeResult::pending()))
                .collect(),
            running: HashSet::new(),
            halted: false,
            failure: None,
        }
    }

    fn status(&self, step_id: &str) -> NodeStatus {
        self.nodes
            .get(step_id)
            .map(|n| n.status)
            .unwrap_or_default()
    }
}

/// Everything one spawned step needs.
struct StepTask {
    runtime: Arc<StepRuntime>,
    prompt: String,
    context: TaskContext,
    reviewer: Arc<dyn CheckpointHandler>,
    events: Option<UnboundedSender<PipelineEvent>>,
    monitor: Option<Arc<WorkerMonitor>>,
}

impl StepTask {
    async fn run(self) -> NodeResult {
        let step = &self.runtime.step;
        let role = step.worker_role;
        let start = Instant::now();
        if let Some(monitor) = &self.monitor {
            monitor.start_step(role, &step.step_id).await;
        }

        let mut node = match AssertUnwindSafe(self.attempt_all()).catch_unwind().await {
            Ok(node) => node,
            Err(_) => NodeResult::failed(NodeErrorKind::StepExecution, "worker panicked"),
        };
        node.duration_ms = start.elapsed().as_millis() as u64;

        if let Some(monitor) = &self.monitor {
            if node.status == NodeStatus::Failed {
                monitor.record_error(role).await;
            }
            monitor.finish_step(role, node.duration_ms).await;
        }
        node
    }

    async fn attempt_all(&self) -> NodeResult {
        let step = &self.runtime.step;
        let worker = &self.runtime.worker;
        let mut attempts = 0;
        let mut last_error = NodeResult::failed(NodeErrorKind::StepExecution, "step never ran");

        while attempts <= step.retry_max {
            attempts += 1;
            if let Some(tx) = &self.events {
                let _ = tx.send(PipelineEvent::StepStarted {
                    step_id: step.step_id.clone(),
                    attempt: attempts,
                });
            }
            info!(step = %step.step_id, worker = %worker.name(), attempt = attempts, "Step started");

            let call = worker.run(&self.prompt, &self.context);
            let outcome = if step.timeout_seconds > 0 {
                match tokio::time::timeout(Duration::from_secs(step.timeout_seconds), call).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        last_error = NodeResult::failed(
                            NodeErrorKind::Timeout,
                            format!("step timed out after {}s", step.timeout_seconds),
                        );
                        continue;
                    }
                }
            } else {
                call.await
            };

            match outcome {
                Ok(output) if output.success => {
                    let mut node = self.review(output.output).await;
                    node.attempts = attempts;
                    return node;
                }
                Ok(output) => {
                    let message = output
                        .error
                        .unwrap_or_else(|| "worker reported failure".to_string());
                    last_error = NodeResult::failed(NodeErrorKind::StepExecution, message);
                }
                Err(e) => {
                    last_error = NodeResult::failed(NodeErrorKind::StepExecution, e.to_string());
                }
            }
            if attempts <= step.retry_max {
                warn!(step = %step.step_id, attempt = attempts, "Step attempt failed, retrying");
            }
        }
        last_error.attempts = attempts;
        last_error
    }

    /// Gate a successful deliverable on the reviewer when the step's
    /// autonomy calls for it.
    async fn review(&self, deliverable: Value) -> NodeResult {
        let step = &self.runtime.step;
        let Some(checkpoint_type) = &step.checkpoint else {
            return NodeResult::succeeded(deliverable);
        };
        if !should_checkpoint(self.runtime.autonomy, checkpoint_type) {
            return NodeResult::succeeded(deliverable);
        }

        if let Some(monitor) = &self.monitor {
            monitor.waiting_for_review(step.worker_role).await;
        }
        let outcome = self
            .reviewer
            .on_checkpoint(self.runtime.worker.name(), checkpoint_type, &deliverable)
            .await;
        match outcome {
            Ok(ReviewOutcome::Approved) => NodeResult::succeeded(deliverable),
            Ok(ReviewOutcome::Rejected { reason }) => {
                NodeResult::failed(NodeErrorKind::CheckpointRejected, reason)
            }
            Ok(ReviewOutcome::Pending { checkpoint_id }) => {
                NodeResult::awaiting_review(checkpoint_id, deliverable)
            }
            Err(e) => NodeResult::failed(NodeErrorKind::StepExecution, e.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dworkers_core::WorkerRole;
    use serde_json::json;

    fn context(pairs: &[(&str, Value)]) -> TaskContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_prompt_fills_placeholders() {
        let step = PlanStep::new("s", "S", WorkerRole::Analyst)
            .with_prompt_template("Size the {industry} market using {a} (n={n}) {missing}");
        let ctx = context(&[
            ("industry", json!("retail")),
            ("a", json!("scope notes")),
            ("n", json!(3)),
        ]);
        assert_eq!(
            render_prompt(&step, &ctx),
            "Size the retail market using scope notes (n=3) {missing}"
        );
    }

    #[test]
    fn test_render_prompt_defaults_to_description() {
        let step = PlanStep::new("s", "S", WorkerRole::Analyst).with_description("Do the thing");
        assert_eq!(render_prompt(&step, &TaskContext::new()), "Do the thing");
    }
}
