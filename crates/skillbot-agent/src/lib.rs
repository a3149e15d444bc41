//! Skillbot Agent — the skill runtime.
//!
//! This crate contains:
//! - **manifest**: `SKILL.md` bundle descriptor parsing
//! - **registry**: bundle discovery, tool loading, atomic hot reload
//! - **selector**: which skills a turn activates
//! - **context**: system instruction and tool schema injection
//! - **tools**: Tool trait, tool modules, and the executor
//! - **agent_loop**: the streaming LLM ↔ tool-calling loop

pub mod agent_loop;
pub mod context;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod selector;
pub mod tools;

pub use agent_loop::{ConversationLoop, LoopState, TurnEvent, TurnEventSink, TurnOutcome, DEFAULT_MAX_ROUNDS};
pub use context::{ContextBuilder, RenderedContext};
pub use error::SkillError;
pub use manifest::{parse_manifest, BundleDescriptor};
pub use registry::{Catalog, CatalogReloader, PluginRegistry, ReloadDiff};
pub use selector::{select, SelectedSkills, SelectionMode};
pub use tools::{NativeToolModule, Tool, ToolCallRequest, ToolCallResult, ToolExecutor, ToolModule};
pub use tokio_util::sync::CancellationToken;
