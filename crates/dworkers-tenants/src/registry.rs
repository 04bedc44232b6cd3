use crate::{loader, TenantConfig};
use dworkers_core::{DworkersError, DworkersResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Thread-safe tenant lookup.
///
/// Registering a tenant that already exists swaps its `Arc`; pipelines that
/// already hold the old config keep running against it.
pub struct TenantRegistry {
    tenants: RwLock<HashMap<String, Arc<TenantConfig>>>,
}

impl TenantRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a tenant.
    pub fn register(&self, config: TenantConfig) -> Arc<TenantConfig> {
        let config = Arc::new(config);
        info!(tenant = %config.id, "Registered tenant");
        self.tenants
            .write()
            .insert(config.id.clone(), Arc::clone(&config));
        config
    }

    /// Fails closed with [`DworkersError::TenantNotFound`].
    pub fn get(&self, tenant_id: &str) -> DworkersResult<Arc<TenantConfig>> {
        self.tenants
            .read()
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| DworkersError::TenantNotFound(tenant_id.to_string()))
    }

    /// `true` if `tenant_id` is registered.
    pub fn has(&self, tenant_id: &str) -> bool {
        self.tenants.read().contains_key(tenant_id)
    }

    /// Returns `true` if a tenant was removed.
    pub fn unregister(&self, tenant_id: &str) -> bool {
        self.tenants.write().remove(tenant_id).is_some()
    }

    /// Registered tenant ids, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of tenants.
    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    /// `true` when no tenant is registered.
    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    /// Drop every tenant.
    pub fn clear(&self) {
        self.tenants.write().clear();
    }

    /// Load and register every tenant file in `dir`. Returns how many were
    /// registered.
    pub fn load_dir(&self, dir: &Path) -> DworkersResult<usize> {
        let configs = loader::load_all_tenants(dir)?;
        let count = configs.len();
        for config in configs {
            self.register(config);
        }
        info!(count, dir = %dir.display(), "Tenant directory loaded");
        Ok(count)
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "Acme"));
        assert!(registry.has("acme"));
        assert_eq!(registry.get("acme").unwrap().name, "Acme");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_unknown_fails_closed() {
        let registry = TenantRegistry::new();
        let err = registry.get("nobody").unwrap_err();
        assert!(matches!(err, DworkersError::TenantNotFound(ref id) if id == "nobody"));
    }

    #[test]
    fn test_reregister_swaps_arc() {
        let registry = TenantRegistry::new();
        let old = registry.register(TenantConfig::new("acme", "Acme"));
        registry.register(TenantConfig::new("acme", "Acme Renamed"));
        assert_eq!(old.name, "Acme");
        assert_eq!(registry.get("acme").unwrap().name, "Acme Renamed");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_list_sorted_unregister_clear() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("zeta", "Z"));
        registry.register(TenantConfig::new("alpha", "A"));
        assert_eq!(registry.list(), vec!["alpha", "zeta"]);

        assert!(registry.unregister("zeta"));
        assert!(!registry.unregister("zeta"));
        registry.clear();
        assert!(registry.is_empty());
    }
}
