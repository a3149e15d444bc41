//! Conversation history persistence for interactive callers.
//!
//! File format: a JSON array in `~/.skillbot/chat_history.json`
//! - `[{"role":"user","content":"hello","timestamp":"..."}, ...]`
//!
//! Only `user` and `assistant` entries are kept. The core never reads this
//! file; callers pass the loaded entries into each turn as prior history.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::Message;
use crate::utils;

/// One persisted history entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Convert to an LLM message. Returns `None` for unsupported roles.
    pub fn to_message(&self) -> Option<Message> {
        match self.role.as_str() {
            "user" => Some(Message::user(&self.content)),
            "assistant" => Some(Message::assistant(&self.content)),
            _ => None,
        }
    }
}

/// Bounded, file-backed conversation history.
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Open the history at `path` (defaults to `~/.skillbot/chat_history.json`).
    ///
    /// A missing or malformed file yields an empty history.
    pub fn open(path: Option<PathBuf>, limit: usize) -> Self {
        let path = path.unwrap_or_else(utils::get_history_path);
        let entries = load_entries(&path);
        let mut store = Self { path, limit, entries };
        store.trim();
        store
    }

    /// History as LLM messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().filter_map(HistoryEntry::to_message).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record one completed turn and persist.
    pub fn record_turn(&mut self, user: &str, assistant: &str) {
        self.entries.push(HistoryEntry::new("user", user));
        self.entries.push(HistoryEntry::new("assistant", assistant));
        self.trim();
        if let Err(e) = self.save() {
            warn!("Failed to persist history {}: {}", self.path.display(), e);
        }
    }

    /// Drop all entries and persist the empty history.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.save() {
            warn!("Failed to persist cleared history: {}", e);
        }
    }

    /// Write the history to disk.
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)?;
        debug!(entries = self.entries.len(), "history saved to {}", self.path.display());
        Ok(())
    }

    fn trim(&mut self) {
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }
}

fn load_entries(path: &Path) -> Vec<HistoryEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
        Ok(entries) => entries
            .into_iter()
            .filter(|e| e.role == "user" || e.role == "assistant")
            .collect(),
        Err(e) => {
            warn!("Ignoring malformed history file {}: {}", path.display(), e);
            Vec::new()
        }
    }
}
