use dworkers_core::{DworkersError, DworkersResult, FailureStrategy};
use dworkers_orchestrator::PipelineResult;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A run result plus what is needed to rebuild its pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    /// Tenant the run executes for.
    pub tenant_id: String,
    /// Strategy in effect when the run started.
    pub strategy: FailureStrategy,
    /// Concurrency bound in effect when the run started.
    pub max_concurrent: usize,
    /// Latest result of the run.
    pub result: PipelineResult,
}

/// Keeps suspended runs so they can be resumed later.
///
/// Entries live in memory; with a directory every save is also written to
/// `<dir>/<run_id>.json` and lookups fall back to that file.
///
/// A run is resumed by one caller at a time: see [`RunStore::claim`].
pub struct RunStore {
    runs: RwLock<HashMap<String, StoredRun>>,
    claimed: Mutex<HashSet<String>>,
    dir: Option<PathBuf>,
}

/// Exclusive hold on a stored run, released on drop.
///
/// With a directory the hold is also a `<run_id>.lock` file, so other
/// processes sharing the directory see it too.
pub struct RunClaim<'a> {
    store: &'a RunStore,
    run_id: String,
    lock_file: Option<PathBuf>,
}

impl RunClaim<'_> {
    /// The claimed run id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl Drop for RunClaim<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.lock_file.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(run = %self.run_id, path = %path.display(), error = %e, "Failed to remove run lock");
            }
        }
        self.store.claimed.lock().remove(&self.run_id);
    }
}

impl RunStore {
    /// Memory-only store.
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            claimed: Mutex::new(HashSet::new()),
            dir: None,
        }
    }

    /// Store that also writes each run to `<dir>/<run_id>.json`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            claimed: Mutex::new(HashSet::new()),
            dir: Some(dir.into()),
        }
    }

    /// Backing directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Insert or replace the entry for `run.result.run_id`.
    pub async fn save(&self, run: StoredRun) -> DworkersResult<()> {
        let run_id = run.result.run_id.clone();
        if let Some(path) = self.path_for(&run_id) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, serde_json::to_string_pretty(&run)?).await?;
            debug!(run = %run_id, path = %path.display(), "Run saved");
        }
        self.runs.write().insert(run_id, run);
        Ok(())
    }

    /// Look up `run_id` in memory, then on disk.
    pub async fn get(&self, run_id: &str) -> DworkersResult<StoredRun> {
        let cached = self.runs.read().get(run_id).cloned();
        if let Some(run) = cached {
            return Ok(run);
        }
        let path = self
            .path_for(run_id)
            .ok_or_else(|| DworkersError::RunNotFound(run_id.to_string()))?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DworkersError::RunNotFound(run_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let run: StoredRun = serde_json::from_str(&raw)?;
        self.runs.write().insert(run_id.to_string(), run.clone());
        Ok(run)
    }

    /// Take the exclusive hold on `run_id` and return it with the stored
    /// run.
    ///
    /// Fails with `InvalidState` while another caller holds the run, in this
    /// process or through the lock file, and with `RunNotFound` for an
    /// unknown id.
    pub async fn claim(&self, run_id: &str) -> DworkersResult<(RunClaim<'_>, StoredRun)> {
        if !self.claimed.lock().insert(run_id.to_string()) {
            return Err(DworkersError::InvalidState(format!(
                "Run '{run_id}' is already being resumed"
            )));
        }
        let mut claim = RunClaim {
            store: self,
            run_id: run_id.to_string(),
            lock_file: None,
        };

        if let Some(path) = self.path_for(run_id) {
            let lock = path.with_extension("lock");
            if let Some(parent) = lock.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock)
                .await
            {
                Ok(_) => claim.lock_file = Some(lock),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    return Err(DworkersError::InvalidState(format!(
                        "Run '{run_id}' is already being resumed (lock file {})",
                        lock.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let run = self.reload(run_id).await?;
        Ok((claim, run))
    }

    /// Read `run_id` from disk when backed by a directory, so a result saved
    /// by another process is picked up; otherwise from memory.
    async fn reload(&self, run_id: &str) -> DworkersResult<StoredRun> {
        if self.path_for(run_id).is_some() {
            self.runs.write().remove(run_id);
        }
        self.get(run_id).await
    }

    /// Run ids held in memory, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of runs held in memory.
    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    /// `true` when no run is held in memory.
    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    /// Drop the in-memory entries. Files on disk are kept.
    pub fn clear(&self) {
        self.runs.write().clear();
    }

    /// File for `run_id`; `None` without a directory or for ids that are
    /// not plain file names.
    fn path_for(&self, run_id: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let plain = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        plain.then(|| dir.join(format!("{run_id}.json")))
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}
