use crate::{AutonomyLevel, DworkersError, DworkersResult, FailureStrategy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DWORKERS_";

/// How checkpoint reviews are carried out when a step asks for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    /// Approve everything immediately.
    Auto,
    /// Block the step until someone resolves the checkpoint (or it times out).
    Block,
    /// Park the checkpoint and end the run as `needs_review`.
    #[default]
    Suspend,
}

impl FromStr for ReviewMode {
    type Err = DworkersError;

    fn from_str(s: &str) -> DworkersResult<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ReviewMode::Auto),
            "block" => Ok(ReviewMode::Block),
            "suspend" => Ok(ReviewMode::Suspend),
            other => Err(DworkersError::Config(format!("Unknown review mode '{other}'"))),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Process-wide settings.
///
/// Loaded from a TOML file where every field is optional, then overridden by
/// `DWORKERS_*` environment variables:
///
/// ```toml
/// default_autonomy = "semi_supervised"
/// tenant_config_dir = "./tenants"
/// max_concurrent_workers = 10
/// default_failure_strategy = "fail_pipeline"
/// data_dir = "./data"
/// review_mode = "suspend"
/// review_timeout_secs = 300
///
/// [server]
/// host = "127.0.0.1"
/// port = 8000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DworkersConfig {
    /// Autonomy used when a tenant has no per-role setting.
    #[serde(default)]
    pub default_autonomy: AutonomyLevel,
    /// Directory scanned for tenant files.
    #[serde(default = "default_tenant_config_dir")]
    pub tenant_config_dir: PathBuf,
    /// Upper bound on steps running at once within one run.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,
    /// Strategy for runs that do not pick one.
    #[serde(default)]
    pub default_failure_strategy: FailureStrategy,
    /// Where runs and checkpoints are persisted.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// How checkpoint reviews are carried out.
    #[serde(default)]
    pub review_mode: ReviewMode,
    /// Upper bound for a blocking review; 0 waits forever.
    #[serde(default = "default_review_timeout_secs")]
    pub review_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_tenant_config_dir() -> PathBuf {
    PathBuf::from("./tenants")
}
fn default_max_concurrent_workers() -> usize {
    10
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_review_timeout_secs() -> u64 {
    300
}

impl Default for DworkersConfig {
    fn default() -> Self {
        Self {
            default_autonomy: AutonomyLevel::default(),
            tenant_config_dir: default_tenant_config_dir(),
            max_concurrent_workers: default_max_concurrent_workers(),
            default_failure_strategy: FailureStrategy::default(),
            data_dir: default_data_dir(),
            server: ServerConfig::default(),
            review_mode: ReviewMode::default(),
            review_timeout_secs: default_review_timeout_secs(),
        }
    }
}

impl DworkersConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> DworkersResult<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| DworkersError::Config(format!("Invalid config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists (defaults otherwise), then apply the
    /// process environment.
    pub fn load(path: &Path) -> DworkersResult<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Self::from_toml_str(&raw)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `DWORKERS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> DworkersResult<()> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides using `lookup(KEY)` where `KEY` is the unprefixed
    /// variable name (e.g. `MAX_CONCURRENT_WORKERS`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> DworkersResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEFAULT_AUTONOMY") {
            self.default_autonomy = v.parse()?;
        }
        if let Some(v) = lookup("TENANT_CONFIG_DIR") {
            self.tenant_config_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAX_CONCURRENT_WORKERS") {
            self.max_concurrent_workers = v.parse().map_err(|_| {
                DworkersError::Config(format!("Invalid max_concurrent_workers '{v}'"))
            })?;
        }
        if let Some(v) = lookup("DEFAULT_FAILURE_STRATEGY") {
            self.default_failure_strategy = v.parse()?;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REVIEW_MODE") {
            self.review_mode = v.parse()?;
        }
        self.validate()
    }

    fn validate(&self) -> DworkersResult<()> {
        if self.max_concurrent_workers == 0 {
            return Err(DworkersError::Config(
                "max_concurrent_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DworkersConfig::default();
        assert_eq!(config.max_concurrent_workers, 10);
        assert_eq!(config.default_failure_strategy, FailureStrategy::FailPipeline);
        assert_eq!(config.default_autonomy, AutonomyLevel::SemiSupervised);
        assert_eq!(config.review_mode, ReviewMode::Suspend);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_partial_toml() {
        let config = DworkersConfig::from_toml_str(
            "max_concurrent_workers = 4\n[server]\nport = 9100\n",
        )
        .unwrap();
        assert_eq!(config.max_concurrent_workers, 4);
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEFAULT_AUTONOMY", "autonomous"),
            ("MAX_CONCURRENT_WORKERS", "3"),
            ("DEFAULT_FAILURE_STRATEGY", "ignore"),
        ]
        .into_iter()
        .collect();
        let mut config = DworkersConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_autonomy, AutonomyLevel::Autonomous);
        assert_eq!(config.max_concurrent_workers, 3);
        assert_eq!(config.default_failure_strategy, FailureStrategy::Ignore);
    }

    #[test]
    fn test_invalid_override_is_config_error() {
        let mut config = DworkersConfig::default();
        let err = config
            .apply_overrides(|k| (k == "MAX_CONCURRENT_WORKERS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, DworkersError::Config(_)));

        let err = config
            .apply_overrides(|k| (k == "MAX_CONCURRENT_WORKERS").then(|| "0".to_string()))
            .unwrap_err();
        assert!(matches!(err, DworkersError::Config(_)));
    }
}
