//! Tools: the capability trait, tool modules, and the executor.

pub mod base;
pub mod executor;
pub mod module;
pub mod process;

pub use base::{optional_string, parse_arguments, require_string, Tool, ToolArgs};
pub use executor::{ToolCallRequest, ToolCallResult, ToolExecutor};
pub use module::{NativeToolModule, ToolModule};
pub use process::{ProcessTool, ProcessToolModule, TOOLS_FILE};
