//! Skillbot Core — shared types, configuration, history, and utilities.
//!
//! This crate contains:
//! - **types**: OpenAI-format messages, tool calls, tool definitions, usage
//! - **config**: JSON config schema, loader, env overrides
//! - **history**: caller-side conversation history file
//! - **utils**: path resolution and string helpers

pub mod config;
pub mod history;
pub mod types;
pub mod utils;

pub use history::HistoryStore;
