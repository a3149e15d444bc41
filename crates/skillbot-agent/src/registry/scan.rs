//! Filesystem discovery of bundles and their tool modules.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   commit-message/SKILL.md
//!   clock/SKILL.md
//!   clock/tools.json
//!   skills-cursor/...        (reserved, never scanned)
//! ```
//!
//! Roots are visited in order and later roots override earlier ones on a
//! name collision. Within a root, subdirectories are visited in sorted order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skillbot_core::utils::RESERVED_SKILLS_DIR;
use tracing::{debug, info, warn};

use crate::error::{Result, SkillError};
use crate::manifest::{parse_manifest, BundleDescriptor};
use crate::tools::{ProcessToolModule, Tool, ToolModule};

use super::catalog::Catalog;

/// Manifest file name inside a bundle directory.
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Native tool modules keyed by bundle name.
pub type NativeModules = HashMap<String, Arc<dyn ToolModule>>;

/// A bundle directory that could not be used.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedBundle {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a full scan.
#[derive(Debug)]
pub struct ScanReport {
    pub catalog: Catalog,
    pub skipped: Vec<SkippedBundle>,
    pub tool_failures: Vec<SkillError>,
}

impl ScanReport {
    /// Human-readable problems, in discovery order.
    pub fn diagnostics(&self) -> Vec<String> {
        let skipped = self
            .skipped
            .iter()
            .map(|s| format!("skipped {}: {}", s.path.display(), s.reason));
        let failures = self.tool_failures.iter().map(|e| e.to_string());
        skipped.chain(failures).collect()
    }

    /// Consume the report, keeping its diagnostics on the catalog.
    pub fn into_catalog(self) -> Catalog {
        let diagnostics = self.diagnostics();
        let mut catalog = self.catalog;
        catalog.set_diagnostics(diagnostics);
        catalog
    }
}

/// Scan `roots` for bundles and load their tools.
pub fn scan(roots: &[PathBuf], natives: &NativeModules) -> ScanReport {
    let mut catalog = Catalog::empty();
    let mut skipped = Vec::new();

    for (source, root) in roots.iter().enumerate() {
        if !root.is_dir() {
            debug!(root = %root.display(), "skills root does not exist, skipping");
            continue;
        }

        for dir in bundle_dirs(root) {
            match load_bundle(&dir, source) {
                Ok(bundle) => {
                    let name = bundle.name.clone();
                    if let Some(previous) = catalog.upsert_bundle(bundle) {
                        info!(
                            bundle = %name,
                            from = %previous.path.display(),
                            to = %dir.display(),
                            "bundle overridden by later root"
                        );
                    } else {
                        debug!(bundle = %name, path = %dir.display(), "discovered bundle");
                    }
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping bundle");
                    skipped.push(SkippedBundle {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    // Tools are attached only to the bundles that survived overriding
    let mut tool_failures = Vec::new();
    let bundles: Vec<BundleDescriptor> = catalog.bundles().to_vec();
    for bundle in &bundles {
        match load_tools(bundle, natives) {
            Ok(tools) => {
                for tool in tools {
                    catalog.register_tool(&bundle.name, tool);
                }
            }
            Err(e) => {
                warn!(bundle = %bundle.name, error = %e, "tool module failed to load, instructions kept");
                tool_failures.push(e);
            }
        }
    }

    info!(
        bundles = catalog.len(),
        tools = catalog.tools().len(),
        skipped = skipped.len(),
        tool_failures = tool_failures.len(),
        "skills scan complete"
    );

    ScanReport {
        catalog,
        skipped,
        tool_failures,
    }
}

/// Load the tool module(s) of one bundle.
///
/// A registered native module contributes first, then `tools.json` if present.
pub fn load_tools(bundle: &BundleDescriptor, natives: &NativeModules) -> Result<Vec<Arc<dyn Tool>>> {
    let mut tools = Vec::new();
    if let Some(module) = natives.get(&bundle.name) {
        tools.extend(module.load(bundle)?);
    }
    if ProcessToolModule::is_present(&bundle.path) {
        tools.extend(ProcessToolModule.load(bundle)?);
    }
    Ok(tools)
}

fn load_bundle(dir: &Path, source: usize) -> Result<BundleDescriptor> {
    let path = dir.join(MANIFEST_FILE);
    let text = std::fs::read_to_string(&path)
        .map_err(|e| SkillError::malformed(format!("cannot read {}: {e}", path.display())))?;
    Ok(parse_manifest(&text)?.located_at(dir.to_path_buf(), source))
}

/// Immediate subdirectories of `root` holding a manifest, sorted by name.
pub(crate) fn bundle_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "cannot read skills root");
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| path.file_name().and_then(|n| n.to_str()) != Some(RESERVED_SKILLS_DIR))
        .filter(|path| path.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();
    dirs
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
