//! Tenant configuration for the dworkers platform.
//!
//! A tenant is one client organisation: its model bindings, enabled
//! industry verticals, per-role worker settings, branding and security
//! policy. Configs are loaded from TOML, YAML or JSON files, held in a
//! [`TenantRegistry`] and handed to pipelines as read-only `Arc`s.

/// The tenant config model.
pub mod config;
/// File loading.
pub mod loader;
/// Thread-safe tenant registry.
pub mod registry;
/// Industry verticals.
pub mod verticals;

pub use config::{
    BrandingConfig, ModelsConfig, SecurityConfig, TenantConfig, WorkerSettings, WorkersConfig,
};
pub use loader::{load_all_tenants, load_tenant_config, parse_tenant_config, TenantFormat};
pub use registry::TenantRegistry;
pub use verticals::{VerticalConfig, VerticalRegistry};
