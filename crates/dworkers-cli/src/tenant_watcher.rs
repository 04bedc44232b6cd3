//! Tenant directory watcher.
//!
//! Watches the tenant config directory and hands every created or modified
//! tenant file, freshly parsed, to a callback after a debounce window.

use dworkers_core::{DworkersError, DworkersResult};
use dworkers_tenants::{load_tenant_config, TenantConfig, TenantFormat};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

/// Keeps the file-system watch alive; dropping it stops watching.
pub struct TenantWatcher {
    _watcher: RecommendedWatcher,
}

impl TenantWatcher {
    /// Start watching `dir`.
    ///
    /// Changes are collected until `debounce_ms` pass without a new event,
    /// then each changed tenant file is parsed once and passed to
    /// `on_reload` on a background thread. Files that fail to parse are
    /// logged and skipped.
    pub fn start<F>(dir: PathBuf, debounce_ms: u64, on_reload: F) -> DworkersResult<Self>
    where
        F: Fn(TenantConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel::<PathBuf>();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        for path in event.paths {
                            let _ = tx.send(path);
                        }
                    }
                }
            })
            .map_err(|e| DworkersError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                DworkersError::Config(format!(
                    "Failed to watch tenant directory '{}': {e}",
                    dir.display()
                ))
            })?;

        std::thread::spawn(move || {
            let debounce = Duration::from_millis(debounce_ms);
            while let Ok(first) = rx.recv() {
                let mut changed = BTreeSet::from([first]);
                while let Ok(path) = rx.recv_timeout(debounce) {
                    changed.insert(path);
                }
                reload_paths(changed, &on_reload);
            }
            tracing::debug!("Tenant watcher thread exiting");
        });

        tracing::info!(dir = %dir.display(), "Tenant watcher started");
        Ok(Self { _watcher: watcher })
    }
}

/// Parse each tenant file in `paths` and pass it to `on_reload`. Returns how
/// many were reloaded.
pub fn reload_paths<I, F>(paths: I, on_reload: &F) -> usize
where
    I: IntoIterator<Item = PathBuf>,
    F: Fn(TenantConfig),
{
    let mut reloaded = 0;
    for path in paths {
        if !path.is_file() || TenantFormat::from_path(&path).is_none() {
            continue;
        }
        match load_tenant_config(&path) {
            Ok(config) => {
                tracing::info!(tenant = %config.id, path = %path.display(), "Tenant reloaded");
                on_reload(config);
                reloaded += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to reload tenant");
            }
        }
    }
    reloaded
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reload_paths_parses_tenant_files() {
        let tmp = tempfile::tempdir().unwrap();
        let toml = tmp.path().join("acme.toml");
        std::fs::write(&toml, "id = \"acme\"\nname = \"Acme\"\n").unwrap();
        let json = tmp.path().join("globex.json");
        std::fs::write(&json, r#"{"id": "globex", "name": "Globex"}"#).unwrap();
        let notes = tmp.path().join("notes.txt");
        std::fs::write(&notes, "not a tenant").unwrap();

        let seen = Mutex::new(Vec::new());
        let count = reload_paths(vec![toml, json, notes], &|config: TenantConfig| {
            seen.lock().unwrap().push(config.id);
        });
        assert_eq!(count, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["acme", "globex"]);
    }

    #[test]
    fn test_reload_paths_skips_broken_and_missing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let broken = tmp.path().join("broken.toml");
        std::fs::write(&broken, "{{{{ not toml").unwrap();
        let missing = tmp.path().join("gone.yaml");

        let count = reload_paths(vec![broken, missing], &|_config: TenantConfig| {
            panic!("nothing should reload");
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let result = TenantWatcher::start(
            PathBuf::from("/nonexistent/tenant/dir"),
            100,
            |_config: TenantConfig| {},
        );
        assert!(result.is_err());
    }
}
