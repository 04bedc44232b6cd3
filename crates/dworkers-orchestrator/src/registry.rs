use crate::plan::Plan;
use crate::templates::builtin_templates;
use dworkers_core::{DworkersError, DworkersResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registered plans by name.
pub struct PlanRegistry {
    plans: RwLock<HashMap<String, Arc<Plan>>>,
}

impl PlanRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the four built-in templates.
    pub fn with_templates() -> Self {
        let registry = Self::new();
        for plan in builtin_templates() {
            registry.replace(plan);
        }
        registry
    }

    /// Register `plan`. A name can only be registered once; use
    /// [`PlanRegistry::replace`] to overwrite.
    pub fn register(&self, plan: Plan) -> DworkersResult<Arc<Plan>> {
        let mut plans = self.plans.write();
        if plans.contains_key(&plan.name) {
            return Err(DworkersError::Config(format!(
                "Plan '{}' is already registered",
                plan.name
            )));
        }
        let plan = Arc::new(plan);
        plans.insert(plan.name.clone(), Arc::clone(&plan));
        info!(plan = %plan.name, steps = plan.steps.len(), "Plan registered");
        Ok(plan)
    }

    /// Register `plan`, replacing any plan with the same name.
    pub fn replace(&self, plan: Plan) -> Arc<Plan> {
        let plan = Arc::new(plan);
        self.plans
            .write()
            .insert(plan.name.clone(), Arc::clone(&plan));
        plan
    }

    /// Fails closed with `PlanNotFound`.
    pub fn get(&self, name: &str) -> DworkersResult<Arc<Plan>> {
        self.plans
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DworkersError::PlanNotFound(name.to_string()))
    }

    /// `true` if `name` is registered.
    pub fn has(&self, name: &str) -> bool {
        self.plans.read().contains_key(name)
    }

    /// Registered plan names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plans.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every plan.
    pub fn clear(&self) {
        self.plans.write().clear();
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::plan::PlanStep;
    use dworkers_core::WorkerRole;

    fn plan(name: &str, steps: usize) -> Plan {
        let mut plan = Plan::new(name, "");
        for i in 0..steps {
            plan.add_step(PlanStep::new(format!("s{i}"), "S", WorkerRole::Analyst));
        }
        plan
    }

    #[test]
    fn test_templates_registered() {
        let registry = PlanRegistry::with_templates();
        assert_eq!(
            registry.list(),
            vec![
                "customer-segmentation",
                "market-analysis",
                "process-improvement",
                "technology-assessment",
            ]
        );
    }

    #[test]
    fn test_duplicate_rejected_replace_wins() {
        let registry = PlanRegistry::new();
        registry.register(plan("p", 1)).unwrap();
        let err = registry.register(plan("p", 2)).unwrap_err();
        assert!(matches!(err, DworkersError::Config(_)));
        assert_eq!(registry.get("p").unwrap().steps.len(), 1);

        registry.replace(plan("p", 2));
        assert_eq!(registry.get("p").unwrap().steps.len(), 2);
    }

    #[test]
    fn test_unknown_plan_and_clear() {
        let registry = PlanRegistry::with_templates();
        assert!(matches!(
            registry.get("nope"),
            Err(DworkersError::PlanNotFound(_))
        ));
        assert!(registry.has("market-analysis"));
        registry.clear();
        assert!(registry.list().is_empty());
    }
}
