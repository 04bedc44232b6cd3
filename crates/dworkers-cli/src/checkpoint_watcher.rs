//! Checkpoint file watcher.
//!
//! `serve` keeps checkpoints in memory. Decisions written to the shared file
//! by `dworkers checkpoint approve|reject` reach a blocked review only when
//! the file is merged back, so the server watches it.

use dworkers_core::{DworkersError, DworkersResult};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

/// Keeps the file-system watch alive; dropping it stops watching.
pub struct CheckpointWatcher {
    _watcher: RecommendedWatcher,
}

impl CheckpointWatcher {
    /// Watch `file` and call `on_change` once per burst of writes.
    ///
    /// The parent directory is watched (and created if missing) because the
    /// file is replaced by rename on every save.
    pub fn start<F>(file: PathBuf, debounce_ms: u64, on_change: F) -> DworkersResult<Self>
    where
        F: Fn() + Send + 'static,
    {
        let dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let name = file
            .file_name()
            .map(OsString::from)
            .ok_or_else(|| {
                DworkersError::Config(format!("Not a checkpoint file: '{}'", file.display()))
            })?;
        std::fs::create_dir_all(&dir)?;

        let (tx, rx) = std_mpsc::channel::<()>();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if !matches!(event.kind, EventKind::Access(_))
                        && touches(&event.paths, &name)
                    {
                        let _ = tx.send(());
                    }
                }
            })
            .map_err(|e| DworkersError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(|e| {
            DworkersError::Config(format!(
                "Failed to watch checkpoint directory '{}': {e}",
                dir.display()
            ))
        })?;

        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            while rx.recv().is_ok() {
                while rx.recv_timeout(debounce).is_ok() {}
                on_change();
            }
            tracing::debug!("Checkpoint watcher thread exiting");
        });

        tracing::info!(file = %file.display(), "Checkpoint watcher started");
        Ok(Self { _watcher: watcher })
    }
}

fn touches(paths: &[PathBuf], name: &OsString) -> bool {
    paths.iter().any(|p| p.file_name() == Some(name.as_os_str()))
}
