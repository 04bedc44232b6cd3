use crate::backend::{ModelBackend, OfflineBackend};
use crate::role::RoleWorker;
use crate::worker::Worker;
use dworkers_core::{DworkersError, DworkersResult, WorkerRole};
use dworkers_tenants::{TenantConfig, VerticalRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Builds a worker named `name` for a tenant.
pub type WorkerConstructor =
    Arc<dyn Fn(&str, &TenantConfig) -> DworkersResult<Arc<dyn Worker>> + Send + Sync>;

/// Role → constructor map used by the plan builder.
pub struct WorkerFactory {
    constructors: RwLock<HashMap<WorkerRole, WorkerConstructor>>,
}

impl WorkerFactory {
    /// A factory with no roles.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// Register [`RoleWorker`]s on `backend` for every role.
    pub fn with_backend(backend: Arc<dyn ModelBackend>) -> Self {
        let factory = Self::new();
        let verticals = Arc::new(VerticalRegistry::with_builtins());
        for role in WorkerRole::ALL {
            let backend = Arc::clone(&backend);
            let verticals = Arc::clone(&verticals);
            let ctor: WorkerConstructor = Arc::new(
                move |name: &str, tenant: &TenantConfig| -> DworkersResult<Arc<dyn Worker>> {
                    let worker = RoleWorker::new(
                        name,
                        role,
                        tenant,
                        &verticals,
                        Arc::clone(&backend),
                        None,
                    )?;
                    Ok(Arc::new(worker))
                },
            );
            // Fresh factory, so registration cannot collide.
            let _ = factory.register(role, ctor);
        }
        factory
    }

    /// All four roles backed by [`OfflineBackend`].
    pub fn with_offline_workers() -> Self {
        Self::with_backend(Arc::new(OfflineBackend::new()))
    }

    /// Register the constructor for `role`. A role can only be registered once.
    pub fn register(&self, role: WorkerRole, ctor: WorkerConstructor) -> DworkersResult<()> {
        let mut constructors = self.constructors.write();
        if constructors.contains_key(&role) {
            return Err(DworkersError::Config(format!(
                "Role '{role}' already has a registered worker"
            )));
        }
        constructors.insert(role, ctor);
        Ok(())
    }

    /// Instantiate the worker for `role`.
    ///
    /// Fails with `WorkerNotFound` for an unregistered role and with a
    /// config error when the tenant has disabled the role.
    pub fn create(
        &self,
        role: WorkerRole,
        tenant: &TenantConfig,
        name: &str,
    ) -> DworkersResult<Arc<dyn Worker>> {
        let ctor = self
            .constructors
            .read()
            .get(&role)
            .cloned()
            .ok_or_else(|| DworkersError::WorkerNotFound(role.to_string()))?;
        if !tenant.role_enabled(role) {
            return Err(DworkersError::Config(format!(
                "Role '{role}' is disabled for tenant '{}'",
                tenant.id
            )));
        }
        let worker = ctor(name, tenant)?;
        info!(worker = %name, role = %role, tenant = %tenant.id, "Worker instantiated");
        Ok(worker)
    }

    /// `true` if `role` has a constructor.
    pub fn has(&self, role: WorkerRole) -> bool {
        self.constructors.read().contains_key(&role)
    }

    /// Registered roles, in declaration order.
    pub fn roles(&self) -> Vec<WorkerRole> {
        let constructors = self.constructors.read();
        WorkerRole::ALL
            .into_iter()
            .filter(|r| constructors.contains_key(r))
            .collect()
    }

    /// Returns `true` if a constructor was removed.
    pub fn unregister(&self, role: WorkerRole) -> bool {
        self.constructors.write().remove(&role).is_some()
    }

    /// Drop every constructor.
    pub fn clear(&self) {
        self.constructors.write().clear();
    }
}

impl Default for WorkerFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_factory_has_all_roles() {
        let factory = WorkerFactory::with_offline_workers();
        assert_eq!(factory.roles(), WorkerRole::ALL.to_vec());
        let tenant = TenantConfig::new("acme", "Acme");
        let worker = factory
            .create(WorkerRole::DataAnalyst, &tenant, "plan-data")
            .unwrap();
        assert_eq!(worker.name(), "plan-data");
        assert_eq!(worker.role(), WorkerRole::DataAnalyst);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let factory = WorkerFactory::with_offline_workers();
        let ctor: WorkerConstructor =
            Arc::new(|_: &str, _: &TenantConfig| Err(DworkersError::Worker("unused".into())));
        let err = factory.register(WorkerRole::Analyst, ctor).unwrap_err();
        assert!(matches!(err, DworkersError::Config(_)));
    }

    #[test]
    fn test_unregistered_role_is_not_found() {
        let factory = WorkerFactory::new();
        let tenant = TenantConfig::new("acme", "Acme");
        let err = factory
            .create(WorkerRole::Manager, &tenant, "m")
            .err()
            .unwrap();
        assert!(matches!(err, DworkersError::WorkerNotFound(ref r) if r == "manager"));
    }

    #[test]
    fn test_disabled_role_is_config_error() {
        let factory = WorkerFactory::with_offline_workers();
        let mut tenant = TenantConfig::new("acme", "Acme");
        tenant.workers.researcher.enabled = false;
        let err = factory
            .create(WorkerRole::Researcher, &tenant, "r")
            .err()
            .unwrap();
        assert!(matches!(err, DworkersError::Config(_)));
    }

    #[test]
    fn test_unregister_and_clear() {
        let factory = WorkerFactory::with_offline_workers();
        assert!(factory.unregister(WorkerRole::Manager));
        assert!(!factory.has(WorkerRole::Manager));
        factory.clear();
        assert!(factory.roles().is_empty());
    }
}
