use dworkers_core::WorkerRole;
use serde::{Deserialize, Serialize};

/// How upstream outputs and pipeline inputs are projected into a step's
/// context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum InputMapping {
    /// Every pipeline input plus every direct upstream output.
    #[default]
    All,
    /// Direct upstream outputs only.
    UpstreamOnly,
    /// A named subset. Every `upstream` entry must be a declared dependency.
    Select {
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        upstream: Vec<String>,
    },
}

/// One node of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique id within the plan.
    pub step_id: String,
    /// Display name.
    pub name: String,
    /// Task text sent to the worker.
    #[serde(default)]
    pub description: String,
    /// Role that runs the step.
    pub worker_role: WorkerRole,
    /// Steps that must succeed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// `{key}` placeholders are filled from the step context. When unset the
    /// description is the prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
    /// Which values the worker sees as context.
    #[serde(default)]
    pub input_mapping: InputMapping,
    /// Checkpoint type the step's deliverable is reviewed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    /// Extra attempts after the first failure.
    #[serde(default)]
    pub retry_max: u32,
    /// Per-attempt bound; 0 means none.
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl PlanStep {
    /// A step with no dependencies, retries, timeout or checkpoint.
    pub fn new(step_id: impl Into<String>, name: impl Into<String>, worker_role: WorkerRole) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            description: String::new(),
            worker_role,
            depends_on: Vec::new(),
            prompt_template: None,
            input_mapping: InputMapping::default(),
            checkpoint: None,
            retry_max: 0,
            timeout_seconds: 0,
        }
    }

    /// Set the task text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append dependencies.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Set the `{key}` prompt template.
    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Set the input mapping.
    pub fn with_input_mapping(mut self, mapping: InputMapping) -> Self {
        self.input_mapping = mapping;
        self
    }

    /// Gate the output behind a checkpoint of this type.
    pub fn with_checkpoint(mut self, checkpoint_type: impl Into<String>) -> Self {
        self.checkpoint = Some(checkpoint_type.into());
        self
    }

    /// Extra attempts after a failure.
    pub fn with_retries(mut self, retry_max: u32) -> Self {
        self.retry_max = retry_max;
        self
    }

    /// Per-attempt timeout; 0 disables it.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }
}

/// A named, reusable DAG of steps.
///
/// Steps are kept in declaration order; that order breaks ties everywhere the
/// engine has a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique plan name.
    pub name: String,
    /// What the plan produces.
    #[serde(default)]
    pub description: String,
    /// Steps in declaration order.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// An empty plan.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    /// Builder form of [`Plan::add_step`].
    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a step.
    pub fn add_step(&mut self, step: PlanStep) {
        self.steps.push(step);
    }

    /// Step by id.
    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Step ids in declaration order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step_id.as_str()).collect()
    }
}
