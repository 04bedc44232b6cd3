use dworkers_core::{AutonomyLevel, WorkerRole};
use serde::{Deserialize, Serialize};

/// Model bindings for a tenant, as `provider:model` strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// General-purpose model.
    #[serde(default = "default_model")]
    pub default: String,
    /// Model for research tasks.
    #[serde(default)]
    pub research: String,
    /// Model for analysis tasks.
    #[serde(default)]
    pub analysis: String,
}

fn default_model() -> String {
    "openai:gpt-4o".to_string()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            research: String::new(),
            analysis: String::new(),
        }
    }
}

impl ModelsConfig {
    /// Model for `purpose` (`research`, `analysis`), falling back to the
    /// default when the purpose is unknown or unset.
    pub fn resolve(&self, purpose: &str) -> &str {
        let value = match purpose {
            "research" => &self.research,
            "analysis" => &self.analysis,
            _ => &self.default,
        };
        if value.is_empty() {
            &self.default
        } else {
            value
        }
    }
}

/// Per-role worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Disabled roles cannot be instantiated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Unset means the process-wide default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomy: Option<AutonomyLevel>,
    /// Appended to the role's system instructions.
    #[serde(default)]
    pub custom_instructions: String,
    /// Advisory per-role task limit.
    #[serde(default = "default_max_tasks")]
    pub max_concurrent_tasks: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_tasks() -> usize {
    10
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            autonomy: None,
            custom_instructions: String::new(),
            max_concurrent_tasks: default_max_tasks(),
        }
    }
}

/// Settings for each of the four roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Analyst settings.
    #[serde(default)]
    pub analyst: WorkerSettings,
    /// Researcher settings.
    #[serde(default)]
    pub researcher: WorkerSettings,
    /// Data analyst settings.
    #[serde(default)]
    pub data_analyst: WorkerSettings,
    /// Manager settings.
    #[serde(default)]
    pub manager: WorkerSettings,
}

impl WorkersConfig {
    /// Settings for `role`.
    pub fn settings_for(&self, role: WorkerRole) -> &WorkerSettings {
        match role {
            WorkerRole::Analyst => &self.analyst,
            WorkerRole::Researcher => &self.researcher,
            WorkerRole::DataAnalyst => &self.data_analyst,
            WorkerRole::Manager => &self.manager,
        }
    }

    /// Mutable settings for `role`.
    pub fn settings_for_mut(&mut self, role: WorkerRole) -> &mut WorkerSettings {
        match role {
            WorkerRole::Analyst => &mut self.analyst,
            WorkerRole::Researcher => &mut self.researcher,
            WorkerRole::DataAnalyst => &mut self.data_analyst,
            WorkerRole::Manager => &mut self.manager,
        }
    }
}

/// How deliverables are branded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingConfig {
    /// Name shown on reports.
    #[serde(default)]
    pub company_name: String,
    /// Report template name.
    #[serde(default = "default_report_template")]
    pub report_template: String,
    /// Logo location.
    #[serde(default)]
    pub logo_url: String,
}

fn default_report_template() -> String {
    "default".to_string()
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            company_name: String::new(),
            report_template: default_report_template(),
            logo_url: String::new(),
        }
    }
}

/// Model allow-list and data handling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Exact `provider:model` strings or `provider:*` wildcards.
    #[serde(default = "default_allowed_models")]
    pub allowed_models: Vec<String>,
    /// Region data must stay in.
    #[serde(default)]
    pub data_residency: String,
    /// Whether stored data must be encrypted.
    #[serde(default)]
    pub encryption_enabled: bool,
}

fn default_allowed_models() -> Vec<String> {
    vec!["openai:*".to_string(), "anthropic:*".to_string()]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_models: default_allowed_models(),
            data_residency: String::new(),
            encryption_enabled: false,
        }
    }
}

impl SecurityConfig {
    /// Check `model` against the allow-list. A lone `*` allows everything.
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|pattern| {
            if pattern == "*" {
                return true;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) => model.starts_with(prefix),
                None => pattern == model,
            }
        })
    }
}

/// Everything the platform knows about one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Unique tenant id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Model bindings.
    #[serde(default)]
    pub models: ModelsConfig,
    /// Vertical names, resolved against a [`crate::VerticalRegistry`].
    #[serde(default)]
    pub verticals: Vec<String>,
    /// Per-role settings.
    #[serde(default)]
    pub workers: WorkersConfig,
    /// Branding.
    #[serde(default)]
    pub branding: BrandingConfig,
    /// Security policy.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl TenantConfig {
    /// A tenant with every section defaulted.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            models: ModelsConfig::default(),
            verticals: Vec::new(),
            workers: WorkersConfig::default(),
            branding: BrandingConfig::default(),
            security: SecurityConfig::default(),
        }
    }

    /// Replace the enabled verticals.
    pub fn with_verticals(mut self, verticals: &[&str]) -> Self {
        self.verticals = verticals.iter().map(|v| v.to_string()).collect();
        self
    }

    /// Settings for `role`.
    pub fn worker_settings(&self, role: WorkerRole) -> &WorkerSettings {
        self.workers.settings_for(role)
    }

    /// `true` unless `role` is disabled.
    pub fn role_enabled(&self, role: WorkerRole) -> bool {
        self.workers.settings_for(role).enabled
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_models_resolve_falls_back_to_default() {
        let models = ModelsConfig {
            default: "openai:gpt-4o".into(),
            research: "anthropic:claude-sonnet".into(),
            analysis: String::new(),
        };
        assert_eq!(models.resolve("research"), "anthropic:claude-sonnet");
        assert_eq!(models.resolve("analysis"), "openai:gpt-4o");
        assert_eq!(models.resolve("unknown"), "openai:gpt-4o");
    }

    #[test]
    fn test_allowed_models_wildcards() {
        let security = SecurityConfig::default();
        assert!(security.is_model_allowed("openai:gpt-4o"));
        assert!(security.is_model_allowed("anthropic:claude-3"));
        assert!(!security.is_model_allowed("mistral:large"));

        let exact = SecurityConfig {
            allowed_models: vec!["offline:echo".into()],
            ..SecurityConfig::default()
        };
        assert!(exact.is_model_allowed("offline:echo"));
        assert!(!exact.is_model_allowed("offline:echo2"));

        let any = SecurityConfig {
            allowed_models: vec!["*".into()],
            ..SecurityConfig::default()
        };
        assert!(any.is_model_allowed("whatever:model"));
    }

    #[test]
    fn test_minimal_tenant_defaults() {
        let tenant: TenantConfig =
            serde_json::from_str(r#"{"id": "acme", "name": "Acme"}"#).unwrap();
        assert_eq!(tenant.models.default, "openai:gpt-4o");
        assert!(tenant.role_enabled(WorkerRole::Manager));
        assert!(tenant.worker_settings(WorkerRole::Analyst).autonomy.is_none());
        assert_eq!(tenant.branding.report_template, "default");
        assert_eq!(tenant, TenantConfig::new("acme", "Acme"));
    }

    #[test]
    fn test_settings_for_mut() {
        let mut tenant = TenantConfig::new("t", "T");
        tenant
            .workers
            .settings_for_mut(WorkerRole::DataAnalyst)
            .enabled = false;
        assert!(!tenant.role_enabled(WorkerRole::DataAnalyst));
        assert!(tenant.role_enabled(WorkerRole::Analyst));
    }
}
