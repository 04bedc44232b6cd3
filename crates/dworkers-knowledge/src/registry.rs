use crate::repository::KnowledgeRepository;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// One [`KnowledgeRepository`] per tenant, created on first use.
pub struct KnowledgeRegistry {
    repositories: RwLock<HashMap<String, Arc<KnowledgeRepository>>>,
}

impl KnowledgeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            repositories: RwLock::new(HashMap::new()),
        }
    }

    /// The repository for `tenant_id`, created empty if needed.
    pub fn repository(&self, tenant_id: &str) -> Arc<KnowledgeRepository> {
        if let Some(repo) = self.repositories.read().get(tenant_id) {
            return Arc::clone(repo);
        }
        Arc::clone(
            self.repositories
                .write()
                .entry(tenant_id.to_string())
                .or_default(),
        )
    }

    /// The repository for `tenant_id` if one was created.
    pub fn get(&self, tenant_id: &str) -> Option<Arc<KnowledgeRepository>> {
        self.repositories.read().get(tenant_id).cloned()
    }

    /// Tenants with a repository, sorted.
    pub fn tenants(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.repositories.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for KnowledgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
