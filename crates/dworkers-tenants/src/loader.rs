use crate::TenantConfig;
use dworkers_core::{DworkersError, DworkersResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Supported tenant file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantFormat {
    /// `.toml`
    Toml,
    /// `.yaml` or `.yml`
    Yaml,
    /// `.json`
    Json,
}

impl TenantFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(TenantFormat::Toml),
            "yaml" | "yml" => Some(TenantFormat::Yaml),
            "json" => Some(TenantFormat::Json),
            _ => None,
        }
    }
}

/// Parse a tenant document. The config may sit at the top level or under a
/// `tenant` table.
pub fn parse_tenant_config(raw: &str, format: TenantFormat) -> DworkersResult<TenantConfig> {
    let mut data: serde_json::Value = match format {
        TenantFormat::Toml => {
            let value: toml::Value = toml::from_str(raw)
                .map_err(|e| DworkersError::Config(format!("Invalid tenant TOML: {e}")))?;
            serde_json::to_value(value)?
        }
        TenantFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(raw)
                .map_err(|e| DworkersError::Config(format!("Invalid tenant YAML: {e}")))?;
            if value.is_null() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::to_value(value).map_err(|e| {
                    DworkersError::Config(format!("Unsupported tenant YAML: {e}"))
                })?
            }
        }
        TenantFormat::Json => serde_json::from_str(raw)
            .map_err(|e| DworkersError::Config(format!("Invalid tenant JSON: {e}")))?,
    };

    if let Some(inner) = data.get_mut("tenant").filter(|v| v.is_object()) {
        data = inner.take();
    }

    serde_json::from_value(data)
        .map_err(|e| DworkersError::Config(format!("Invalid tenant config: {e}")))
}

/// Load one tenant file.
pub fn load_tenant_config(path: &Path) -> DworkersResult<TenantConfig> {
    if !path.exists() {
        return Err(DworkersError::Config(format!(
            "Tenant config file not found: {}",
            path.display()
        )));
    }
    let format = TenantFormat::from_path(path).ok_or_else(|| {
        DworkersError::Config(format!(
            "Unsupported tenant config format: {}",
            path.display()
        ))
    })?;
    let raw = std::fs::read_to_string(path)?;
    let config = parse_tenant_config(&raw, format)?;
    info!(tenant = %config.id, path = %path.display(), "Loaded tenant config");
    Ok(config)
}

/// Load every supported file in `dir`, in file-name order. Files with other
/// extensions are ignored.
pub fn load_all_tenants(dir: &Path) -> DworkersResult<Vec<TenantConfig>> {
    if !dir.is_dir() {
        return Err(DworkersError::Config(format!(
            "Tenant config directory not found: {}",
            dir.display()
        )));
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| TenantFormat::from_path(p).is_some())
        .collect();
    paths.sort();

    let mut configs = Vec::with_capacity(paths.len());
    for path in paths {
        match load_tenant_config(&path) {
            Ok(config) => configs.push(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load tenant config");
                return Err(e);
            }
        }
    }
    Ok(configs)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use dworkers_core::{AutonomyLevel, WorkerRole};

    #[test]
    fn test_parse_toml_with_wrapper() {
        let raw = r#"
[tenant]
id = "acme"
name = "Acme Corp"
verticals = ["banking"]

[tenant.workers.analyst]
autonomy = "manual"
"#;
        let config = parse_tenant_config(raw, TenantFormat::Toml).unwrap();
        assert_eq!(config.id, "acme");
        assert_eq!(config.verticals, vec!["banking"]);
        assert_eq!(
            config.worker_settings(WorkerRole::Analyst).autonomy,
            Some(AutonomyLevel::Manual)
        );
    }

    #[test]
    fn test_parse_yaml() {
        let raw = "id: globex\nname: Globex\nworkers:\n  manager:\n    enabled: false\n";
        let config = parse_tenant_config(raw, TenantFormat::Yaml).unwrap();
        assert_eq!(config.id, "globex");
        assert!(!config.role_enabled(WorkerRole::Manager));
    }

    #[test]
    fn test_parse_missing_id_is_config_error() {
        let err = parse_tenant_config(r#"{"name": "nameless"}"#, TenantFormat::Json).unwrap_err();
        assert!(matches!(err, DworkersError::Config(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            TenantFormat::from_path(Path::new("a/b.yml")),
            Some(TenantFormat::Yaml)
        );
        assert_eq!(TenantFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(TenantFormat::from_path(Path::new("README")), None);
    }
}
