//! Plugin registry — owns the current catalog and swaps it on reload.
//!
//! Readers take an `Arc<Catalog>` snapshot and keep it for a whole turn.
//! A reload scans off to the side and publishes the new catalog with one
//! pointer swap under a write lock held only for the swap. Reloads are
//! serialized; any number of readers run concurrently with one.

pub mod catalog;
pub mod reloader;
pub mod scan;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{info, warn};

use skillbot_core::config::SkillsConfig;
use skillbot_core::utils::resolve_skills_dir;

use crate::tools::ToolModule;

pub use catalog::{Catalog, RegisteredTool, ToolSpec};
pub use reloader::{CatalogReloader, Fingerprint};
pub use scan::{load_tools, scan, NativeModules, ScanReport, SkippedBundle, MANIFEST_FILE};

// ─────────────────────────────────────────────
// ReloadDiff
// ─────────────────────────────────────────────

/// What changed between two catalogs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReloadDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub tools_added: Vec<String>,
    pub tools_removed: Vec<String>,
    /// Problems found while building the new catalog.
    pub diagnostics: Vec<String>,
}

impl ReloadDiff {
    /// Compare `old` to `new`.
    pub fn between(old: &Catalog, new: &Catalog) -> Self {
        let mut diff = ReloadDiff {
            diagnostics: new.diagnostics().to_vec(),
            ..Default::default()
        };

        for bundle in new.bundles() {
            match old.bundle(&bundle.name) {
                None => diff.added.push(bundle.name.clone()),
                Some(prev) => {
                    let tools_differ = tool_names_of(old, &bundle.name) != tool_names_of(new, &bundle.name);
                    if prev != bundle || tools_differ {
                        diff.changed.push(bundle.name.clone());
                    }
                }
            }
        }
        for bundle in old.bundles() {
            if !new.contains(&bundle.name) {
                diff.removed.push(bundle.name.clone());
            }
        }

        let old_tools: BTreeSet<&str> = old.tools().iter().map(|t| t.spec.tool_name.as_str()).collect();
        let new_tools: BTreeSet<&str> = new.tools().iter().map(|t| t.spec.tool_name.as_str()).collect();
        diff.tools_added = new_tools.difference(&old_tools).map(|s| s.to_string()).collect();
        diff.tools_removed = old_tools.difference(&new_tools).map(|s| s.to_string()).collect();

        diff
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.tools_added.is_empty()
            && self.tools_removed.is_empty()
    }
}

fn tool_names_of<'a>(catalog: &'a Catalog, bundle: &'a str) -> Vec<(&'a str, &'a serde_json::Value)> {
    catalog
        .tools_of(bundle)
        .map(|t| (t.spec.tool_name.as_str(), &t.spec.schema.function.parameters))
        .collect()
}

// ─────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────

/// Configures and performs the initial scan.
#[derive(Default)]
pub struct RegistryBuilder {
    roots: Vec<PathBuf>,
    defaults: Vec<String>,
    natives: NativeModules,
}

impl RegistryBuilder {
    /// Append a root directory (later roots override earlier ones).
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Resolve configured root keys against `project_root` and set the default skill set.
    pub fn from_config(mut self, config: &SkillsConfig, project_root: &Path) -> Self {
        self.roots
            .extend(config.paths.iter().map(|key| resolve_skills_dir(key, project_root)));
        self.defaults = config.defaults.clone();
        self
    }

    /// The skill set activated when the caller names none.
    pub fn defaults(mut self, defaults: Vec<String>) -> Self {
        self.defaults = defaults;
        self
    }

    /// Attach a native tool module to the bundle called `bundle`.
    pub fn native_module(mut self, bundle: &str, module: impl ToolModule + 'static) -> Self {
        self.natives.insert(bundle.trim().to_lowercase(), Arc::new(module));
        self
    }

    /// Run the initial full scan.
    pub fn build(self) -> PluginRegistry {
        let natives = Arc::new(self.natives);
        let catalog = build_catalog(&self.roots, &natives, &self.defaults);
        PluginRegistry {
            roots: self.roots,
            defaults: self.defaults,
            natives,
            current: RwLock::new(Arc::new(catalog)),
            reload_lock: Mutex::new(()),
        }
    }
}

fn build_catalog(roots: &[PathBuf], natives: &NativeModules, defaults: &[String]) -> Catalog {
    let mut catalog = scan(roots, natives).into_catalog();
    catalog.set_defaults(defaults.to_vec());
    for name in catalog.defaults() {
        if !catalog.contains(name) {
            warn!(skill = %name, "configured default skill not found");
        }
    }
    catalog
}

// ─────────────────────────────────────────────
// PluginRegistry
// ─────────────────────────────────────────────

/// Holds the published catalog.
pub struct PluginRegistry {
    roots: Vec<PathBuf>,
    defaults: Vec<String>,
    natives: Arc<NativeModules>,
    current: RwLock<Arc<Catalog>>,
    reload_lock: Mutex<()>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Root directories in scan order.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The current catalog. Stays valid for as long as the caller holds it.
    pub fn snapshot(&self) -> Arc<Catalog> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Rescan all roots and publish the result.
    ///
    /// The scan runs on the blocking pool; in-flight turns keep using the
    /// snapshot they already hold.
    pub async fn reload(&self) -> ReloadDiff {
        let _serialized = self.reload_lock.lock().await;

        let roots = self.roots.clone();
        let natives = Arc::clone(&self.natives);
        let defaults = self.defaults.clone();
        let new_catalog = match tokio::task::spawn_blocking(move || build_catalog(&roots, &natives, &defaults)).await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                warn!(error = %e, "catalog rebuild task failed, keeping current catalog");
                return ReloadDiff {
                    diagnostics: vec![format!("reload failed: {e}")],
                    ..Default::default()
                };
            }
        };

        let old = self.publish(Arc::clone(&new_catalog));
        let diff = ReloadDiff::between(&old, &new_catalog);
        info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            changed = diff.changed.len(),
            tools_added = diff.tools_added.len(),
            tools_removed = diff.tools_removed.len(),
            "skills catalog reloaded"
        );
        diff
    }

    fn publish(&self, catalog: Arc<Catalog>) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, catalog)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("roots", &self.roots)
            .field("bundles", &self.snapshot().len())
            .finish()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn write_bundle(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), format!("---\nname: {name}\n---\n{body}")).unwrap();
    }

    #[tokio::test]
    async fn test_held_snapshot_survives_reload() {
        let root = tempfile::tempdir().unwrap();
        write_bundle(root.path(), "old-skill", "old");

        let registry = PluginRegistry::builder().root(root.path()).build();
        let before = registry.snapshot();

        std::fs::remove_dir_all(root.path().join("old-skill")).unwrap();
        write_bundle(root.path(), "new-skill", "new");
        let diff = registry.reload().await;

        assert_eq!(diff.added, vec!["new-skill"]);
        assert_eq!(diff.removed, vec!["old-skill"]);

        // The held snapshot is untouched; new readers see the new catalog
        assert!(before.contains("old-skill"));
        assert!(!before.contains("new-skill"));
        let after = registry.snapshot();
        assert!(after.contains("new-skill"));
        assert!(!after.contains("old-skill"));
    }

    #[tokio::test]
    async fn test_reload_reports_changed_and_empty_diff() {
        let root = tempfile::tempdir().unwrap();
        write_bundle(root.path(), "a", "v1");
        let registry = PluginRegistry::builder().root(root.path()).build();

        assert!(registry.reload().await.is_empty());

        write_bundle(root.path(), "a", "v2");
        let diff = registry.reload().await;
        assert_eq!(diff.changed, vec!["a"]);
        assert_eq!(registry.snapshot().bundle("a").unwrap().body, "v2");
    }

    #[tokio::test]
    async fn test_concurrent_readers_always_see_a_whole_catalog() {
        let root = tempfile::tempdir().unwrap();
        write_bundle(root.path(), "a", "x");
        write_bundle(root.path(), "b", "x");
        let registry = Arc::new(PluginRegistry::builder().root(root.path()).build());

        let reader = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snap = registry.snapshot();
                    // Both bundles are always written together
                    assert_eq!(snap.contains("a"), snap.contains("b"));
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..5 {
            registry.reload().await;
        }
        reader.await.unwrap();
    }

    #[test]
    fn test_defaults_and_config_roots() {
        let project = tempfile::tempdir().unwrap();
        write_bundle(&project.path().join("skills"), "shell", "run");
        let config = SkillsConfig {
            paths: vec!["skills".into()],
            defaults: vec!["shell".into(), "ghost".into()],
            reload_interval_secs: 0,
        };

        let registry = PluginRegistry::builder().from_config(&config, project.path()).build();
        assert_eq!(registry.roots(), [project.path().join("skills")]);
        let snap = registry.snapshot();
        assert!(snap.contains("shell"));
        assert_eq!(snap.defaults(), ["shell", "ghost"]);
    }
}
