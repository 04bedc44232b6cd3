use chrono::{DateTime, Utc};
use dworkers_core::{DworkersError, DworkersResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle of a checkpoint. Only `Pending` can change, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Awaiting a decision.
    Pending,
    /// Deliverable accepted.
    Approved,
    /// Deliverable refused; see `rejection_reason`.
    Rejected,
}

/// A review gate on one worker deliverable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique id.
    pub id: String,
    /// Worker that produced the deliverable.
    pub worker_name: String,
    /// Checkpoint type, e.g. `deliverable` or `final_output`.
    pub phase: String,
    /// The output under review.
    pub deliverable: serde_json::Value,
    /// Current decision.
    pub status: CheckpointStatus,
    /// Set on rejection; empty otherwise.
    #[serde(default)]
    pub rejection_reason: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Decision time.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    fn pending(id: String, worker_name: &str, phase: &str, deliverable: serde_json::Value) -> Self {
        Self {
            id,
            worker_name: worker_name.to_string(),
            phase: phase.to_string(),
            deliverable,
            status: CheckpointStatus::Pending,
            rejection_reason: String::new(),
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// `true` once approved or rejected.
    pub fn is_resolved(&self) -> bool {
        self.status != CheckpointStatus::Pending
    }
}

/// Shared store of checkpoints.
///
/// Every read and write goes through one mutex, so a checkpoint moves from
/// pending to approved or rejected exactly once. Waiters in
/// [`CheckpointStore::wait_for_resolution`] are woken on every resolution.
pub struct CheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    resolved: Notify,
}

impl CheckpointStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            checkpoints: Mutex::new(HashMap::new()),
            resolved: Notify::new(),
        }
    }

    /// Store a pending checkpoint under a caller-chosen id.
    pub fn submit(
        &self,
        checkpoint_id: &str,
        deliverable: serde_json::Value,
        worker_name: &str,
        phase: &str,
    ) -> DworkersResult<Checkpoint> {
        let mut checkpoints = self.checkpoints.lock();
        if checkpoints.contains_key(checkpoint_id) {
            return Err(DworkersError::InvalidState(format!(
                "Checkpoint '{checkpoint_id}' already exists"
            )));
        }
        let cp = Checkpoint::pending(checkpoint_id.to_string(), worker_name, phase, deliverable);
        checkpoints.insert(cp.id.clone(), cp.clone());
        info!(checkpoint = %cp.id, worker = %worker_name, phase = %phase, "Checkpoint created");
        Ok(cp)
    }

    /// Store a pending checkpoint under a fresh UUID.
    pub fn create(
        &self,
        deliverable: serde_json::Value,
        worker_name: &str,
        phase: &str,
    ) -> Checkpoint {
        let cp = Checkpoint::pending(Uuid::new_v4().to_string(), worker_name, phase, deliverable);
        self.checkpoints.lock().insert(cp.id.clone(), cp.clone());
        info!(checkpoint = %cp.id, worker = %worker_name, phase = %phase, "Checkpoint created");
        cp
    }

    /// Resolve a pending checkpoint. Fails with `CheckpointNotFound` for an
    /// unknown id and `InvalidState` if it was already resolved.
    pub fn resolve(
        &self,
        checkpoint_id: &str,
        approved: bool,
        reason: &str,
    ) -> DworkersResult<Checkpoint> {
        let resolved = {
            let mut checkpoints = self.checkpoints.lock();
            let cp = checkpoints
                .get_mut(checkpoint_id)
                .ok_or_else(|| DworkersError::CheckpointNotFound(checkpoint_id.to_string()))?;
            if cp.is_resolved() {
                return Err(DworkersError::InvalidState(format!(
                    "Checkpoint '{checkpoint_id}' already {}",
                    if cp.status == CheckpointStatus::Approved {
                        "approved"
                    } else {
                        "rejected"
                    }
                )));
            }
            if approved {
                cp.status = CheckpointStatus::Approved;
            } else {
                cp.status = CheckpointStatus::Rejected;
                cp.rejection_reason = reason.to_string();
            }
            cp.resolved_at = Some(Utc::now());
            cp.clone()
        };
        info!(checkpoint = %checkpoint_id, approved, "Checkpoint resolved");
        self.resolved.notify_waiters();
        Ok(resolved)
    }

    /// Shorthand for an approving [`CheckpointStore::resolve`].
    pub fn approve(&self, checkpoint_id: &str) -> DworkersResult<Checkpoint> {
        self.resolve(checkpoint_id, true, "")
    }

    /// Shorthand for a rejecting [`CheckpointStore::resolve`].
    pub fn reject(&self, checkpoint_id: &str, reason: &str) -> DworkersResult<Checkpoint> {
        self.resolve(checkpoint_id, false, reason)
    }

    /// Copy of one checkpoint.
    pub fn get(&self, checkpoint_id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().get(checkpoint_id).cloned()
    }

    fn status_of(&self, checkpoint_id: &str) -> Option<CheckpointStatus> {
        self.checkpoints.lock().get(checkpoint_id).map(|cp| cp.status)
    }

    /// `false` for unknown ids.
    pub fn is_pending(&self, checkpoint_id: &str) -> bool {
        self.status_of(checkpoint_id) == Some(CheckpointStatus::Pending)
    }

    /// `false` for unknown ids.
    pub fn is_approved(&self, checkpoint_id: &str) -> bool {
        self.status_of(checkpoint_id) == Some(CheckpointStatus::Approved)
    }

    /// `false` for unknown ids.
    pub fn is_rejected(&self, checkpoint_id: &str) -> bool {
        self.status_of(checkpoint_id) == Some(CheckpointStatus::Rejected)
    }

    /// All checkpoints, oldest first.
    pub fn list(&self) -> Vec<Checkpoint> {
        let mut all: Vec<Checkpoint> = self.checkpoints.lock().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Pending checkpoints, oldest first.
    pub fn list_pending(&self) -> Vec<Checkpoint> {
        self.list()
            .into_iter()
            .filter(|cp| cp.status == CheckpointStatus::Pending)
            .collect()
    }

    /// Number of checkpoints, resolved included.
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    /// `true` when the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }

    /// Drop every checkpoint.
    pub fn clear(&self) {
        self.checkpoints.lock().clear();
    }

    /// Wait until `checkpoint_id` is resolved and return it.
    ///
    /// With a timeout, an unresolved checkpoint is rejected with a
    /// "timed out" reason when the deadline passes. If someone else resolves
    /// it first, their decision stands.
    pub async fn wait_for_resolution(
        &self,
        checkpoint_id: &str,
        timeout: Option<Duration>,
    ) -> DworkersResult<Checkpoint> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            let notified = self.resolved.notified();
            tokio::pin!(notified);
            // Register before checking so a resolution in between is not missed.
            notified.as_mut().enable();

            let cp = self
                .get(checkpoint_id)
                .ok_or_else(|| DworkersError::CheckpointNotFound(checkpoint_id.to_string()))?;
            if cp.is_resolved() {
                return Ok(cp);
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        let secs = timeout.map(|t| t.as_secs()).unwrap_or_default();
                        warn!(checkpoint = %checkpoint_id, secs, "Checkpoint review timed out");
                        return match self.reject(checkpoint_id, &format!("timed out after {secs}s")) {
                            Ok(cp) => Ok(cp),
                            Err(DworkersError::InvalidState(_)) => self.get(checkpoint_id).ok_or_else(
                                || DworkersError::CheckpointNotFound(checkpoint_id.to_string()),
                            ),
                            Err(e) => Err(e),
                        };
                    }
                }
            }
        }
    }

    /// Fold `incoming` into the store without undoing a decision.
    ///
    /// Unknown ids are added. A resolved record replaces a pending one with
    /// the same id; a pending record never replaces a resolved one, and the
    /// first recorded decision wins between two resolved records. Returns how
    /// many entries changed.
    pub fn merge(&self, incoming: Vec<Checkpoint>) -> usize {
        let mut changed = 0;
        {
            let mut checkpoints = self.checkpoints.lock();
            for cp in incoming {
                match checkpoints.get(&cp.id) {
                    Some(existing) if existing.is_resolved() || !cp.is_resolved() => {}
                    _ => {
                        checkpoints.insert(cp.id.clone(), cp);
                        changed += 1;
                    }
                }
            }
        }
        if changed > 0 {
            self.resolved.notify_waiters();
        }
        changed
    }

    /// Write every checkpoint to `path` as a pretty-printed JSON array.
    ///
    /// Decisions already in the file are merged in first, so a record
    /// resolved by another process is never written back as pending. The
    /// file is replaced through a rename.
    pub async fn save_to(&self, path: &Path) -> DworkersResult<()> {
        self.load_from(path).await?;
        let json = serde_json::to_string_pretty(&self.list())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Merge checkpoints from a file written by [`CheckpointStore::save_to`]
    /// (see [`CheckpointStore::merge`]). Returns the number of records in
    /// the file; a missing file loads nothing.
    pub async fn load_from(&self, path: &Path) -> DworkersResult<usize> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let loaded: Vec<Checkpoint> = serde_json::from_str(&data).map_err(|e| {
            DworkersError::Config(format!(
                "Failed to parse checkpoints from {}: {e}",
                path.display()
            ))
        })?;
        let count = loaded.len();
        let changed = self.merge(loaded);
        if changed > 0 {
            debug!(changed, path = %path.display(), "Checkpoints merged from file");
        }
        Ok(count)
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_create_is_pending() {
        let store = CheckpointStore::new();
        let cp = store.create(json!({"report": "draft"}), "analyst-1", "deliverable");
        assert!(store.is_pending(&cp.id));
        assert!(!store.is_approved(&cp.id));
        assert_eq!(store.list_pending().len(), 1);
        assert!(cp.resolved_at.is_none());
    }

    #[test]
    fn test_submit_duplicate_id() {
        let store = CheckpointStore::new();
        store.submit("cp-1", json!(1), "w", "p").unwrap();
        let err = store.submit("cp-1", json!(2), "w", "p").unwrap_err();
        assert!(matches!(err, DworkersError::InvalidState(_)));
        assert_eq!(store.get("cp-1").unwrap().deliverable, json!(1));
    }

    #[test]
    fn test_approve_and_reject() {
        let store = CheckpointStore::new();
        let a = store.create(json!("a"), "w", "p");
        let b = store.create(json!("b"), "w", "p");

        let approved = store.approve(&a.id).unwrap();
        assert_eq!(approved.status, CheckpointStatus::Approved);
        assert!(approved.resolved_at.is_some());

        let rejected = store.reject(&b.id, "not enough evidence").unwrap();
        assert_eq!(rejected.rejection_reason, "not enough evidence");
        assert!(store.is_rejected(&b.id));
        assert!(store.list_pending().is_empty());
    }

    #[test]
    fn test_double_resolution_is_invalid_state() {
        let store = CheckpointStore::new();
        let cp = store.create(json!(null), "w", "p");
        store.approve(&cp.id).unwrap();

        let err = store.reject(&cp.id, "late").unwrap_err();
        assert!(matches!(err, DworkersError::InvalidState(_)));
        assert!(store.is_approved(&cp.id));
        assert_eq!(store.get(&cp.id).unwrap().rejection_reason, "");
    }

    #[test]
    fn test_resolve_unknown_is_not_found() {
        let store = CheckpointStore::new();
        let err = store.approve("missing").unwrap_err();
        assert!(matches!(err, DworkersError::CheckpointNotFound(_)));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_clear() {
        let store = CheckpointStore::new();
        store.create(json!(1), "w", "p");
        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_wait_wakes_on_resolution() {
        let store = Arc::new(CheckpointStore::new());
        let cp = store.create(json!("x"), "w", "p");

        let waiter = {
            let store = store.clone();
            let id = cp.id.clone();
            tokio::spawn(async move { store.wait_for_resolution(&id, None).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.approve(&cp.id).unwrap();

        let resolved = waiter.await.unwrap().unwrap();
        assert_eq!(resolved.status, CheckpointStatus::Approved);
    }

    #[tokio::test]
    async fn test_wait_times_out_as_rejection() {
        let store = CheckpointStore::new();
        let cp = store.create(json!("x"), "w", "p");

        let resolved = store
            .wait_for_resolution(&cp.id, Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(resolved.status, CheckpointStatus::Rejected);
        assert!(resolved.rejection_reason.starts_with("timed out"));
    }

    #[tokio::test]
    async fn test_wait_already_resolved_returns_immediately() {
        let store = CheckpointStore::new();
        let cp = store.create(json!("x"), "w", "p");
        store.reject(&cp.id, "no").unwrap();
        let resolved = store
            .wait_for_resolution(&cp.id, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(resolved.rejection_reason, "no");
    }

    #[tokio::test]
    async fn test_wait_unknown_is_not_found() {
        let store = CheckpointStore::new();
        assert!(store.wait_for_resolution("nope", None).await.is_err());
    }
}
