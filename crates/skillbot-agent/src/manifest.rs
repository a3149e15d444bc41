//! Bundle descriptor parser — `SKILL.md` front-matter and body.
//!
//! # Format
//!
//! ```text
//! ---
//! name: commit-message
//! description: Write conventional commit messages
//! triggers: [提交说明, commit message]
//! ---
//!
//! # Commit messages
//!
//! Use the form `type(scope): summary` ...
//! ```
//!
//! `triggers` may also be a comma-separated string (`"提交说明, commit"`).
//! Parsing is pure; the registry attaches the bundle path and root index.

use std::path::PathBuf;

use serde_yaml::Value;

use crate::error::{Result, SkillError};

/// A parsed bundle: instructions plus matching signals.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleDescriptor {
    /// Unique lowercase name.
    pub name: String,
    /// Display description (original text).
    pub description: String,
    /// Lowercased description used for matching.
    pub match_description: String,
    /// Lowercase trigger keywords, possibly empty.
    pub triggers: Vec<String>,
    /// Instruction text injected verbatim.
    pub body: String,
    /// Directory the bundle was loaded from (empty until scanned).
    pub path: PathBuf,
    /// Index of the root the bundle came from.
    pub source: usize,
}

impl BundleDescriptor {
    /// Attach the on-disk location assigned by the registry.
    pub fn located_at(mut self, path: PathBuf, source: usize) -> Self {
        self.path = path;
        self.source = source;
        self
    }
}

/// Parse a manifest into a [`BundleDescriptor`].
///
/// Fails with [`SkillError::MalformedManifest`] when the front-matter fences
/// are missing, the YAML is invalid or not a mapping, or `name` is absent.
pub fn parse_manifest(text: &str) -> Result<BundleDescriptor> {
    let (front, body) = split_front_matter(text)?;

    let meta: Value = serde_yaml::from_str(&front)
        .map_err(|e| SkillError::malformed(format!("invalid YAML front-matter: {e}")))?;
    let Value::Mapping(meta) = meta else {
        return Err(SkillError::malformed("front-matter is not a mapping"));
    };

    let name = meta
        .get("name")
        .and_then(scalar_string)
        .map(|n| n.trim().to_lowercase())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SkillError::malformed("missing required field: name"))?;

    let description = meta
        .get("description")
        .and_then(scalar_string)
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    let triggers = meta.get("triggers").map(parse_triggers).unwrap_or_default();

    Ok(BundleDescriptor {
        match_description: description.to_lowercase(),
        name,
        description,
        triggers,
        body,
        path: PathBuf::new(),
        source: 0,
    })
}

/// Split `---` fenced front-matter from the body.
fn split_front_matter(text: &str) -> Result<(String, String)> {
    let text = text.replace("\r\n", "\n");
    let text = text.trim_start_matches('\u{feff}');

    let mut lines = text.split('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return Err(SkillError::malformed("missing leading '---' fence")),
    }

    let mut front = Vec::new();
    let mut closed = false;
    for line in &mut lines {
        if line.trim_end() == "---" {
            closed = true;
            break;
        }
        front.push(line);
    }
    if !closed {
        return Err(SkillError::malformed("unterminated front-matter (missing closing '---')"));
    }

    let body = lines.collect::<Vec<_>>().join("\n");
    let body = body.trim_start_matches('\n').trim_end().to_string();
    Ok((front.join("\n"), body))
}

/// Accept a YAML list or a comma-separated string.
fn parse_triggers(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s.split([',', '，']).map(String::from).collect(),
        _ => Vec::new(),
    };

    let mut triggers: Vec<String> = Vec::new();
    for t in raw {
        let t = t.trim().to_lowercase();
        if !t.is_empty() && !triggers.contains(&t) {
            triggers.push(t);
        }
    }
    triggers
}

/// Strings, numbers and booleans as text; anything else is absent.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
