//! Free-form projects: a manager decomposes a brief, specialists work the
//! pieces in parallel, and the manager synthesises the result.

use crate::builder::PlanBuilder;
use crate::events::PipelineEvent;
use crate::plan::{Plan, PlanStep};
use crate::types::NodeStatus;
use chrono::Utc;
use dworkers_core::{DworkersConfig, DworkersError, DworkersResult, FailureStrategy, WorkerRole};
use dworkers_tenants::TenantConfig;
use dworkers_workers::{TaskContext, WorkerFactory};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Project-scoped facts shared by the workers of one project.
pub struct ProjectWorkspace {
    project_id: String,
    facts: RwLock<BTreeMap<String, Value>>,
}

impl ProjectWorkspace {
    /// An empty workspace.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            facts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Owning project.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Insert or replace a fact.
    pub fn set_fact(&self, key: impl Into<String>, value: Value) {
        self.facts.write().insert(key.into(), value);
    }

    /// Copy of one fact.
    pub fn get_fact(&self, key: &str) -> Option<Value> {
        self.facts.read().get(key).cloned()
    }

    /// Every fact, sorted by key.
    pub fn all_facts(&self) -> BTreeMap<String, Value> {
        self.facts.read().clone()
    }

    /// One `- key: value` line per fact; empty when there are none.
    pub fn context(&self) -> String {
        self.facts
            .read()
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("- {key}: {s}"),
                other => format!("- {key}: {other}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON object with the project id and every fact.
    pub fn snapshot(&self) -> Value {
        json!({
            "project_id": self.project_id,
            "facts": self.all_facts(),
            "saved_at": Utc::now(),
        })
    }

    /// Merge the facts of a snapshot into this workspace.
    pub fn restore(&self, snapshot: &Value) {
        if let Some(facts) = snapshot.get("facts").and_then(Value::as_object) {
            let mut current = self.facts.write();
            for (key, value) in facts {
                current.insert(key.clone(), value.clone());
            }
        }
    }

    /// Write [`ProjectWorkspace::snapshot`] to `path`.
    pub async fn save_to_file(&self, path: &Path) -> DworkersResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(&self.snapshot())?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }

    /// Restore from `path`; a missing file leaves the workspace untouched.
    pub async fn load_from_file(&self, path: &Path) -> DworkersResult<()> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let snapshot: Value = serde_json::from_str(&raw).map_err(|e| {
            DworkersError::Config(format!("Invalid workspace file {}: {e}", path.display()))
        })?;
        self.restore(&snapshot);
        Ok(())
    }
}

/// Outcome of [`ProjectOrchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectResult {
    /// Run completed and the synthesis step succeeded.
    pub success: bool,
    /// Task results plus the summary or synthesis error.
    pub deliverables: Value,
    /// Wall-clock time.
    pub duration_ms: u64,
}

const ROLE_KEYWORDS: [(WorkerRole, &[&str]); 4] = [
    (
        WorkerRole::Researcher,
        &["research", "investigate", "survey", "literature", "background", "explore"],
    ),
    (
        WorkerRole::Analyst,
        &["analyze", "recommend", "evaluate", "assess", "compare", "review"],
    ),
    (
        WorkerRole::DataAnalyst,
        &["data", "statistics", "metrics", "quantitative", "numbers", "dataset"],
    ),
    (
        WorkerRole::Manager,
        &["coordinate", "plan", "schedule", "timeline", "milestone"],
    ),
];

/// Assign each non-empty line of a decomposition to a role by keyword.
/// The first role with a matching keyword wins; the default is analyst.
pub fn map_to_workers(decomposition: &str) -> Vec<(WorkerRole, String)> {
    decomposition
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let lower = line.to_lowercase();
            let role = ROLE_KEYWORDS
                .iter()
                .find(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
                .map(|(role, _)| *role)
                .unwrap_or(WorkerRole::Analyst);
            (role, line.to_string())
        })
        .collect()
}

/// Runs a free-form brief as an ad-hoc plan on the regular pipeline.
pub struct ProjectOrchestrator {
    tenant: Arc<TenantConfig>,
    workspace: Arc<ProjectWorkspace>,
    factory: Arc<WorkerFactory>,
    config: DworkersConfig,
    events: Option<UnboundedSender<PipelineEvent>>,
}

impl ProjectOrchestrator {
    /// An empty `project_id` becomes `"default"`.
    pub fn new(tenant: Arc<TenantConfig>, project_id: &str) -> Self {
        let project_id = if project_id.is_empty() {
            "default"
        } else {
            project_id
        };
        Self {
            tenant,
            workspace: Arc::new(ProjectWorkspace::new(project_id)),
            factory: Arc::new(WorkerFactory::with_offline_workers()),
            config: DworkersConfig::default(),
            events: None,
        }
    }

    /// Use `factory` for the manager and task workers.
    pub fn with_factory(mut self, factory: Arc<WorkerFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Use `config` for autonomy and concurrency.
    pub fn with_config(mut self, config: DworkersConfig) -> Self {
        self.config = config;
        self
    }

    /// Forward pipeline events to `tx`.
    pub fn with_events(mut self, tx: UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Facts shared across the project's tasks.
    pub fn workspace(&self) -> &Arc<ProjectWorkspace> {
        &self.workspace
    }

    /// Decompose, execute and synthesise. Failures are reported in the
    /// result rather than returned.
    pub async fn run(&self, brief: &str) -> ProjectResult {
        let start = Instant::now();
        let project_id = self.workspace.project_id().to_string();
        info!(project = %project_id, tenant = %self.tenant.id, "Project started");

        let (success, deliverables) = match self.execute(brief).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(project = %project_id, error = %e, "Project failed");
                (false, json!({ "error": e.to_string() }))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(project = %project_id, success, duration_ms, "Project finished");
        ProjectResult {
            success,
            deliverables,
            duration_ms,
        }
    }

    async fn execute(&self, brief: &str) -> DworkersResult<(bool, Value)> {
        let tasks = self.decompose(brief).await?;
        let plan = self.project_plan(&tasks);

        let mut pipeline = PlanBuilder::new(Arc::new(plan), Arc::clone(&self.tenant))
            .with_factory(Arc::clone(&self.factory))
            .with_config(self.config.clone())
            .build()?
            .with_strategy(FailureStrategy::Ignore);
        if let Some(tx) = &self.events {
            pipeline = pipeline.with_events(tx.clone());
        }

        let mut inputs = serde_json::Map::new();
        inputs.insert("brief".into(), Value::String(brief.to_string()));
        let result = pipeline.run(inputs).await?;

        let mut task_results = serde_json::Map::new();
        for i in 0..tasks.len() {
            let step_id = format!("task-{i}");
            let value = match result.node(&step_id) {
                Some(node) if node.status == NodeStatus::Success => {
                    node.output.clone().unwrap_or(Value::Null)
                }
                Some(node) => json!({
                    "error": node.error.as_ref().map(|e| e.message.clone()).unwrap_or_default()
                }),
                None => Value::Null,
            };
            self.workspace.set_fact(format!("task_{i}_result"), value.clone());
            task_results.insert(format!("task_{i}"), value);
        }

        let mut deliverables = serde_json::Map::new();
        deliverables.insert("task_results".into(), Value::Object(task_results));
        let synthesis = result.node("synthesis");
        let synthesized = matches!(synthesis, Some(n) if n.status == NodeStatus::Success);
        match synthesis {
            Some(node) if synthesized => {
                deliverables.insert("summary".into(), node.output.clone().unwrap_or(Value::Null));
            }
            Some(node) => {
                let message = node
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default();
                warn!(project = %self.workspace.project_id(), error = %message, "Synthesis failed");
                deliverables.insert("synthesis_error".into(), Value::String(message));
            }
            None => {}
        }
        Ok((result.success && synthesized, Value::Object(deliverables)))
    }

    /// Ask the manager for a task list. An empty or failed answer falls
    /// back to a researcher + analyst pair.
    async fn decompose(&self, brief: &str) -> DworkersResult<Vec<(WorkerRole, String)>> {
        let project_id = self.workspace.project_id();
        let manager = self.factory.create(
            WorkerRole::Manager,
            &self.tenant,
            &format!("manager-{project_id}"),
        )?;
        let prompt = format!("Decompose this project brief into tasks, one per line:\n{brief}");
        let tasks = match manager.run(&prompt, &TaskContext::new()).await {
            Ok(output) if output.success => map_to_workers(&output.text()),
            Ok(output) => {
                warn!(project = %project_id, error = ?output.error, "Decomposition failed");
                Vec::new()
            }
            Err(e) => {
                warn!(project = %project_id, error = %e, "Decomposition failed");
                Vec::new()
            }
        };
        if !tasks.is_empty() {
            return Ok(tasks);
        }
        Ok(vec![
            (
                WorkerRole::Researcher,
                format!("Research background and context for: {brief}"),
            ),
            (
                WorkerRole::Analyst,
                format!("Analyze and provide recommendations for: {brief}"),
            ),
        ])
    }

    /// Independent task steps feeding one manager synthesis step.
    fn project_plan(&self, tasks: &[(WorkerRole, String)]) -> Plan {
        let project_id = self.workspace.project_id();
        let shared = self.workspace.context();
        let mut plan = Plan::new(
            format!("project-{project_id}"),
            format!("Ad-hoc plan for project '{project_id}'"),
        );
        let mut task_ids = Vec::with_capacity(tasks.len());
        for (i, (role, task)) in tasks.iter().enumerate() {
            let step_id = format!("task-{i}");
            let description = if shared.is_empty() {
                task.clone()
            } else {
                format!("{task}\n\nShared workspace context:\n{shared}")
            };
            plan.add_step(
                PlanStep::new(&step_id, format!("Task {i}"), *role).with_description(description),
            );
            task_ids.push(step_id);
        }
        let deps: Vec<&str> = task_ids.iter().map(String::as_str).collect();
        plan.add_step(
            PlanStep::new("synthesis", "Synthesis", WorkerRole::Manager)
                .with_prompt_template(
                    "Original brief: {brief}\n\nSynthesize a final deliverable from the task results.",
                )
                .depends_on(&deps),
        );
        plan
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_mapping() {
        let tasks = map_to_workers(
            "Research the competitor landscape\n\n  Compile quarterly metrics  \nSchedule the kickoff\nWrite the summary",
        );
        assert_eq!(
            tasks,
            vec![
                (WorkerRole::Researcher, "Research the competitor landscape".to_string()),
                (WorkerRole::DataAnalyst, "Compile quarterly metrics".to_string()),
                (WorkerRole::Manager, "Schedule the kickoff".to_string()),
                (WorkerRole::Analyst, "Write the summary".to_string()),
            ]
        );
    }

    #[test]
    fn test_first_matching_role_wins() {
        // "analyze" (analyst) is checked before "data" (data analyst).
        let tasks = map_to_workers("Analyze the sales data");
        assert_eq!(tasks[0].0, WorkerRole::Analyst);
    }

    #[test]
    fn test_workspace_facts_and_context() {
        let ws = ProjectWorkspace::new("p1");
        assert_eq!(ws.context(), "");
        ws.set_fact("b", json!(2));
        ws.set_fact("a", json!("first"));
        assert_eq!(ws.get_fact("b"), Some(json!(2)));
        assert_eq!(ws.context(), "- a: first\n- b: 2");
    }

    #[test]
    fn test_snapshot_restore() {
        let ws = ProjectWorkspace::new("p1");
        ws.set_fact("k", json!("v"));
        let other = ProjectWorkspace::new("p2");
        other.restore(&ws.snapshot());
        assert_eq!(other.get_fact("k"), Some(json!("v")));
        assert_eq!(ws.snapshot()["project_id"], "p1");
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ws.json");
        let ws = ProjectWorkspace::new("p1");
        ws.set_fact("finding", json!({"tam": 12}));
        ws.save_to_file(&path).await.unwrap();

        let loaded = ProjectWorkspace::new("p1");
        loaded.load_from_file(&path).await.unwrap();
        assert_eq!(loaded.all_facts(), ws.all_facts());

        let missing = ProjectWorkspace::new("p1");
        missing
            .load_from_file(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(missing.all_facts().is_empty());
    }

    #[tokio::test]
    async fn test_offline_project_runs_end_to_end() {
        let tenant = Arc::new(TenantConfig::new("acme", "Acme"));
        let orchestrator = ProjectOrchestrator::new(tenant, "");
        assert_eq!(orchestrator.workspace().project_id(), "default");

        let result = orchestrator.run("Enter the Brazilian fintech market").await;
        assert!(result.success, "{:?}", result.deliverables);
        let summary = result.deliverables["summary"].as_str().unwrap();
        assert!(summary.contains("Original brief: Enter the Brazilian fintech market"));
        let task_count = result.deliverables["task_results"]
            .as_object()
            .unwrap()
            .len();
        assert!(task_count > 0);
        assert!(orchestrator.workspace().get_fact("task_0_result").is_some());
    }
}
