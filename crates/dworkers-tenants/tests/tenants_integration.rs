#![allow(clippy::unwrap_used, clippy::expect_used)]

use dworkers_core::{AutonomyLevel, DworkersError, WorkerRole};
use dworkers_tenants::*;
use std::fs;

// ---------------------------------------------------------------------------
// 1. Loading all three formats from a directory
// ---------------------------------------------------------------------------

#[test]
fn load_dir_accepts_toml_yaml_and_json() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join("acme.toml"),
        r#"
id = "acme"
name = "Acme Corp"
verticals = ["banking", "technology"]

[models]
research = "anthropic:claude-sonnet"

[workers.researcher]
autonomy = "autonomous"
custom_instructions = "Cite every source."
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("globex.yaml"),
        r#"
tenant:
  id: globex
  name: Globex
  security:
    allowed_models: ["offline:*"]
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join("initech.json"),
        r#"{"tenant": {"id": "initech", "name": "Initech", "branding": {"company_name": "Initech"}}}"#,
    )
    .unwrap();

    fs::write(dir.path().join("README.md"), "not a tenant").unwrap();

    let registry = TenantRegistry::new();
    let count = registry.load_dir(dir.path()).unwrap();
    assert_eq!(count, 3);
    assert_eq!(registry.list(), vec!["acme", "globex", "initech"]);

    let acme = registry.get("acme").unwrap();
    assert_eq!(acme.models.resolve("research"), "anthropic:claude-sonnet");
    assert_eq!(acme.models.resolve("analysis"), "openai:gpt-4o");
    let researcher = acme.worker_settings(WorkerRole::Researcher);
    assert_eq!(researcher.autonomy, Some(AutonomyLevel::Autonomous));
    assert_eq!(researcher.custom_instructions, "Cite every source.");

    let globex = registry.get("globex").unwrap();
    assert!(globex.security.is_model_allowed("offline:echo"));
    assert!(!globex.security.is_model_allowed("openai:gpt-4o"));

    let initech = registry.get("initech").unwrap();
    assert_eq!(initech.branding.company_name, "Initech");
}

// ---------------------------------------------------------------------------
// 2. Error paths
// ---------------------------------------------------------------------------

#[test]
fn missing_dir_and_file_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();

    let err = load_all_tenants(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, DworkersError::Config(_)));

    let err = load_tenant_config(&dir.path().join("ghost.yaml")).unwrap_err();
    assert!(matches!(err, DworkersError::Config(_)));

    let txt = dir.path().join("tenant.txt");
    fs::write(&txt, "id = 1").unwrap();
    let err = load_tenant_config(&txt).unwrap_err();
    assert!(err.to_string().contains("Unsupported"));
}

#[test]
fn malformed_file_fails_the_whole_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("good.json"), r#"{"id": "good", "name": "Good"}"#).unwrap();
    fs::write(dir.path().join("bad.yaml"), "id: [unclosed").unwrap();

    let registry = TenantRegistry::new();
    assert!(registry.load_dir(dir.path()).is_err());
}

// ---------------------------------------------------------------------------
// 3. Verticals resolved from a tenant
// ---------------------------------------------------------------------------

#[test]
fn tenant_verticals_resolve_to_prompt_fragments() {
    let tenant = TenantConfig::new("acme", "Acme").with_verticals(&["healthcare", "gaming"]);
    let verticals = VerticalRegistry::with_builtins();
    let fragments = verticals.fragments_for(&tenant.verticals);
    assert_eq!(fragments.len(), 2);
    assert!(fragments[0].contains("HIPAA"));
    assert!(fragments[1].contains("DAU"));
}
