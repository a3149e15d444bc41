//! Skill selector — which bundles to activate for one turn.
//!
//! Precedence:
//! 1. Explicit names from the caller (`all` activates everything).
//! 2. The catalog's configured default set.
//! 3. Automatic matching against the user's text.
//!
//! Automatic matching is case-insensitive and favors recall. A bundle with
//! triggers activates when any trigger is a substring of the text. A bundle
//! without triggers activates when any token of its description or name
//! (length > 1 after stripping `.,，。:：`) appears in the text.

use tracing::{debug, warn};

use crate::error::SkillError;
use crate::registry::Catalog;

/// Explicit name that activates every bundle.
pub const ALL_SKILLS: &str = "all";

const TOKEN_PUNCTUATION: &[char] = &['.', ',', '，', '。', ':', '：'];

/// How the active set was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionMode {
    Explicit,
    Defaults,
    Automatic,
}

/// The bundles activated for a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectedSkills {
    /// Bundle names in catalog order.
    pub names: Vec<String>,
    /// Requested names that are not in the catalog.
    pub unknown: Vec<String>,
    pub mode: SelectionMode,
}

impl SelectedSkills {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Unknown names as warnings.
    pub fn warnings(&self) -> Vec<SkillError> {
        self.unknown
            .iter()
            .cloned()
            .map(SkillError::UnknownSkillRequested)
            .collect()
    }
}

/// Pick the bundles to activate.
///
/// Deterministic for a given catalog and input.
pub fn select(user_text: &str, catalog: &Catalog, explicit_names: &[String]) -> SelectedSkills {
    let explicit: Vec<String> = explicit_names
        .iter()
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .collect();

    let selected = if !explicit.is_empty() {
        if explicit.iter().any(|n| n == ALL_SKILLS) {
            SelectedSkills {
                names: catalog.bundles().iter().map(|b| b.name.clone()).collect(),
                unknown: Vec::new(),
                mode: SelectionMode::Explicit,
            }
        } else {
            resolve_named(&explicit, catalog, SelectionMode::Explicit)
        }
    } else if !catalog.defaults().is_empty() {
        resolve_named(catalog.defaults(), catalog, SelectionMode::Defaults)
    } else {
        SelectedSkills {
            names: auto_match(user_text, catalog),
            unknown: Vec::new(),
            mode: SelectionMode::Automatic,
        }
    };

    for warning in selected.warnings() {
        warn!("{warning}");
    }
    debug!(mode = ?selected.mode, skills = ?selected.names, "skills selected");
    selected
}

fn resolve_named(names: &[String], catalog: &Catalog, mode: SelectionMode) -> SelectedSkills {
    let mut known: Vec<(usize, String)> = Vec::new();
    let mut unknown = Vec::new();

    for name in names {
        match catalog.position(name) {
            Some(pos) if !known.iter().any(|(p, _)| *p == pos) => known.push((pos, name.clone())),
            Some(_) => {}
            None if !unknown.contains(name) => unknown.push(name.clone()),
            None => {}
        }
    }

    known.sort_by_key(|(pos, _)| *pos);
    SelectedSkills {
        names: known.into_iter().map(|(_, n)| n).collect(),
        unknown,
        mode,
    }
}

fn auto_match(user_text: &str, catalog: &Catalog) -> Vec<String> {
    let text = user_text.trim().to_lowercase();
    if text.is_empty() {
        return Vec::new();
    }

    catalog
        .bundles()
        .iter()
        .filter(|bundle| {
            if bundle.triggers.is_empty() {
                let name_words = bundle.name.replace('-', " ");
                bundle
                    .match_description
                    .split_whitespace()
                    .chain(name_words.split_whitespace())
                    .map(|token| token.trim_matches(TOKEN_PUNCTUATION))
                    .any(|token| token.chars().count() > 1 && text.contains(token))
            } else {
                bundle.triggers.iter().any(|t| text.contains(t.as_str()))
            }
        })
        .map(|bundle| bundle.name.clone())
        .collect()
}
