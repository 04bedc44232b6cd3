use crate::backend::{CompletionRequest, ModelBackend};
use crate::stream::{DeltaSink, StreamMode, WorkerStream};
use crate::worker::{TaskContext, Worker, WorkerOutput};
use async_trait::async_trait;
use dworkers_core::{DworkersError, DworkersResult, WorkerRole};
use dworkers_tenants::{TenantConfig, VerticalRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed opening of the system instructions for `role`.
pub fn role_preamble(role: WorkerRole) -> &'static str {
    match role {
        WorkerRole::Analyst => {
            "You are an expert consulting analyst. Your role is to analyze business \
             processes, gather requirements, identify gaps, and produce actionable \
             recommendations."
        }
        WorkerRole::Researcher => {
            "You are an expert consulting researcher. Your role is to conduct thorough \
             market research, competitive analysis, trend identification, and literature \
             reviews. Synthesize findings into clear, well-sourced reports."
        }
        WorkerRole::DataAnalyst => {
            "You are an expert data analyst. Your role is to process, analyze, and \
             interpret data from multiple sources. Produce clear, data-driven insights \
             and statistical summaries that inform consulting recommendations."
        }
        WorkerRole::Manager => {
            "You are an experienced consulting engagement manager. Your role is to \
             coordinate the team, break work into tasks, track progress, and review \
             deliverables for quality and scope."
        }
    }
}

/// The tenant model purpose a role draws from.
pub fn model_purpose(role: WorkerRole) -> &'static str {
    match role {
        WorkerRole::Researcher => "research",
        WorkerRole::Analyst | WorkerRole::DataAnalyst => "analysis",
        WorkerRole::Manager => "default",
    }
}

/// The worker used for all four consulting roles.
///
/// Instructions are the role preamble, then the tenant's vertical fragments,
/// then the tenant's custom instructions for the role.
pub struct RoleWorker {
    name: String,
    role: WorkerRole,
    model: String,
    instructions: String,
    backend: Arc<dyn ModelBackend>,
}

impl RoleWorker {
    /// Build a worker for `tenant`. `model` overrides the tenant binding; the
    /// chosen model must pass the tenant's allow-list.
    pub fn new(
        name: impl Into<String>,
        role: WorkerRole,
        tenant: &TenantConfig,
        verticals: &VerticalRegistry,
        backend: Arc<dyn ModelBackend>,
        model: Option<&str>,
    ) -> DworkersResult<Self> {
        let name = name.into();
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| tenant.models.resolve(model_purpose(role)))
            .to_string();
        if !tenant.security.is_model_allowed(&model) {
            return Err(DworkersError::Config(format!(
                "Model '{model}' is not allowed for tenant '{}'",
                tenant.id
            )));
        }

        let mut parts = vec![role_preamble(role).to_string()];
        parts.extend(verticals.fragments_for(&tenant.verticals));
        let custom = &tenant.worker_settings(role).custom_instructions;
        if !custom.is_empty() {
            parts.push(custom.clone());
        }

        info!(worker = %name, role = %role, model = %model, backend = backend.name(), "Worker created");
        Ok(Self {
            name,
            role,
            model,
            instructions: parts.join("\n\n"),
            backend,
        })
    }

    /// Model binding resolved for the role.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Full system instructions.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    fn request(&self, task: &str, context: &TaskContext) -> CompletionRequest {
        let mut prompt = task.to_string();
        if !context.is_empty() {
            prompt.push_str("\n\nContext:\n");
            for (key, value) in context {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                prompt.push_str(&format!("- {key}: {rendered}\n"));
            }
        }
        CompletionRequest {
            model: self.model.clone(),
            system: self.instructions.clone(),
            prompt,
        }
    }
}

#[async_trait]
impl Worker for RoleWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> WorkerRole {
        self.role
    }

    async fn run(&self, task: &str, context: &TaskContext) -> DworkersResult<WorkerOutput> {
        let request = self.request(task, context);
        match self.backend.complete(&request).await {
            Ok(text) => Ok(WorkerOutput::success(text)),
            Err(DworkersError::Cancelled) => Err(DworkersError::Cancelled),
            Err(e) => {
                warn!(worker = %self.name, error = %e, "Model call failed");
                Ok(WorkerOutput::failure(e.to_string()))
            }
        }
    }

    async fn run_stream(
        &self,
        task: &str,
        context: &TaskContext,
        mode: StreamMode,
    ) -> DworkersResult<WorkerStream> {
        let request = self.request(task, context);
        let backend = Arc::clone(&self.backend);
        Ok(WorkerStream::spawn(mode, move |sink: DeltaSink| async move {
            match backend.complete_stream(&request, &sink).await {
                Ok(text) => Ok::<_, DworkersError>(WorkerOutput::success(text)),
                Err(DworkersError::Cancelled) => Err(DworkersError::Cancelled),
                Err(e) => Ok(WorkerOutput::failure(e.to_string())),
            }
        }))
    }
}
