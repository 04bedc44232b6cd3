use crate::worker::Worker;
use dworkers_core::{DworkersError, DworkersResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Live worker instances by name.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
}

impl WorkerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Register under `worker.name()`, replacing any previous instance.
    pub fn register(&self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        self.workers.write().insert(name, worker);
    }

    /// Fails closed with `WorkerNotFound`.
    pub fn get(&self, name: &str) -> DworkersResult<Arc<dyn Worker>> {
        self.workers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DworkersError::WorkerNotFound(name.to_string()))
    }

    /// `true` if `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.workers.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if a worker was removed.
    pub fn unregister(&self, name: &str) -> bool {
        self.workers.write().remove(name).is_some()
    }

    /// Drop every worker.
    pub fn clear(&self) {
        self.workers.write().clear();
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::WorkerFactory;
    use dworkers_core::WorkerRole;
    use dworkers_tenants::TenantConfig;

    #[test]
    fn test_register_get_list() {
        let factory = WorkerFactory::with_offline_workers();
        let tenant = TenantConfig::new("acme", "Acme");
        let registry = WorkerRegistry::new();
        registry.register(factory.create(WorkerRole::Manager, &tenant, "zed").unwrap());
        registry.register(factory.create(WorkerRole::Analyst, &tenant, "amy").unwrap());

        assert_eq!(registry.list(), vec!["amy", "zed"]);
        assert_eq!(registry.get("zed").unwrap().role(), WorkerRole::Manager);
        assert!(registry.has("amy"));
    }

    #[test]
    fn test_get_unknown_fails_closed() {
        let registry = WorkerRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(DworkersError::WorkerNotFound(_))
        ));
    }

    #[test]
    fn test_unregister_and_clear() {
        let factory = WorkerFactory::with_offline_workers();
        let tenant = TenantConfig::new("acme", "Acme");
        let registry = WorkerRegistry::new();
        registry.register(factory.create(WorkerRole::Researcher, &tenant, "r").unwrap());
        assert!(registry.unregister("r"));
        assert!(!registry.unregister("r"));
        registry.register(factory.create(WorkerRole::Researcher, &tenant, "r").unwrap());
        registry.clear();
        assert!(registry.list().is_empty());
    }
}
