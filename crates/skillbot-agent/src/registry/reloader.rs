//! Background catalog reloader.
//!
//! Every interval the reloader fingerprints the bundle files under the
//! registry roots (path, length, mtime) and reloads only when the
//! fingerprint changed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Notify;
use tracing::{debug, info};

use super::scan::bundle_dirs;
use super::{PluginRegistry, ReloadDiff};

/// Snapshot of the files that make up the catalog.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fingerprint(Vec<(PathBuf, u64, Option<SystemTime>)>);

impl Fingerprint {
    /// Fingerprint every file of every bundle directory under `roots`.
    pub fn of_roots(roots: &[PathBuf]) -> Self {
        let mut entries = Vec::new();
        for root in roots.iter().filter(|r| r.is_dir()) {
            for dir in bundle_dirs(root) {
                collect_files(&dir, &mut entries);
            }
        }
        entries.sort();
        Fingerprint(entries)
    }

    /// Number of files covered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn collect_files(dir: &Path, out: &mut Vec<(PathBuf, u64, Option<SystemTime>)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_file() {
            out.push((path, meta.len(), meta.modified().ok()));
        }
    }
}

// ─────────────────────────────────────────────
// CatalogReloader
// ─────────────────────────────────────────────

/// Periodically reloads a registry when its files change.
pub struct CatalogReloader {
    registry: Arc<PluginRegistry>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl CatalogReloader {
    pub fn new(registry: Arc<PluginRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        info!(interval_s = self.interval.as_secs(), "skills reloader started");
        let mut last = self.fingerprint().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if let Some(diff) = self.tick(&mut last).await {
                        if !diff.is_empty() {
                            info!(
                                added = ?diff.added,
                                removed = ?diff.removed,
                                changed = ?diff.changed,
                                "skills changed on disk"
                            );
                        }
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("skills reloader shutting down");
                    return;
                }
            }
        }
    }

    /// Stop the reloader. Takes effect even if `run` has not started waiting yet.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Reload if the fingerprint moved since `last`.
    async fn tick(&self, last: &mut Fingerprint) -> Option<ReloadDiff> {
        let current = self.fingerprint().await;
        if current == *last {
            debug!(files = current.len(), "skills unchanged");
            return None;
        }
        *last = current;
        Some(self.registry.reload().await)
    }

    async fn fingerprint(&self) -> Fingerprint {
        let roots = self.registry.roots().to_vec();
        tokio::task::spawn_blocking(move || Fingerprint::of_roots(&roots))
            .await
            .unwrap_or_default()
    }
}
