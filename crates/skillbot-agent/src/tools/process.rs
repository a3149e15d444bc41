//! Process tool modules — tools implemented as external commands.
//!
//! A bundle directory may contain `tools.json`:
//!
//! ```json
//! {
//!   "tools": [
//!     {"type": "function", "function": {"name": "get_time", "description": "...", "parameters": {...}}}
//!   ],
//!   "dispatch": {
//!     "get_time": ["python3", "tools.py", "get_time"],
//!     "slow_job": {"command": ["./job.sh"], "timeout_secs": 300}
//!   }
//! }
//! ```
//!
//! The command runs in the bundle directory and receives
//! `{"name": ..., "arguments": {...}}` on stdin. Stdout is parsed as JSON,
//! falling back to a plain string. A non-zero exit status is a failure
//! carrying stderr.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use skillbot_core::types::ToolDefinition;

use crate::error::{Result, SkillError};
use crate::manifest::BundleDescriptor;

use super::base::{Tool, ToolArgs};
use super::module::ToolModule;

/// File name of a process tool module inside a bundle directory.
pub const TOOLS_FILE: &str = "tools.json";

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_STDERR_LEN: usize = 2000;

#[derive(Debug, Deserialize)]
struct ToolsFile {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    dispatch: HashMap<String, DispatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DispatchEntry {
    Argv(Vec<String>),
    Detailed {
        command: Vec<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl DispatchEntry {
    fn into_parts(self) -> (Vec<String>, u64) {
        match self {
            DispatchEntry::Argv(argv) => (argv, DEFAULT_TIMEOUT_SECS),
            DispatchEntry::Detailed {
                command,
                timeout_secs,
            } => (command, timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

// ─────────────────────────────────────────────
// Module
// ─────────────────────────────────────────────

/// Loads `tools.json` from a bundle directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessToolModule;

impl ProcessToolModule {
    /// Whether `dir` declares a process tool module.
    pub fn is_present(dir: &Path) -> bool {
        dir.join(TOOLS_FILE).is_file()
    }
}

impl ToolModule for ProcessToolModule {
    fn load(&self, bundle: &BundleDescriptor) -> Result<Vec<Arc<dyn Tool>>> {
        let file = bundle.path.join(TOOLS_FILE);
        let raw = std::fs::read_to_string(&file)
            .map_err(|e| SkillError::load_failure(&bundle.name, format!("cannot read {}: {e}", file.display())))?;
        let parsed: ToolsFile = serde_json::from_str(&raw)
            .map_err(|e| SkillError::load_failure(&bundle.name, format!("invalid {TOOLS_FILE}: {e}")))?;

        let mut dispatch = parsed.dispatch;
        let mut tools: Vec<Arc<dyn Tool>> = Vec::with_capacity(parsed.tools.len());

        for def in parsed.tools {
            let name = def.function.name.clone();
            let entry = dispatch.remove(&name).ok_or_else(|| {
                SkillError::load_failure(&bundle.name, format!("tool '{name}' has no dispatch entry"))
            })?;
            let (argv, timeout_secs) = entry.into_parts();
            if argv.is_empty() {
                return Err(SkillError::load_failure(
                    &bundle.name,
                    format!("dispatch command for '{name}' is empty"),
                ));
            }

            tools.push(Arc::new(ProcessTool {
                definition: def,
                argv,
                cwd: bundle.path.clone(),
                timeout: Duration::from_secs(timeout_secs),
            }));
        }

        for orphan in dispatch.keys() {
            warn!(bundle = %bundle.name, dispatch = %orphan, "dispatch entry without a declared tool");
        }

        debug!(bundle = %bundle.name, tools = tools.len(), "process tool module loaded");
        Ok(tools)
    }
}

// ─────────────────────────────────────────────
// Tool
// ─────────────────────────────────────────────

/// One tool backed by an external command.
#[derive(Debug)]
pub struct ProcessTool {
    definition: ToolDefinition,
    argv: Vec<String>,
    cwd: PathBuf,
    timeout: Duration,
}

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        &self.definition.function.name
    }

    fn description(&self) -> &str {
        &self.definition.function.description
    }

    fn parameters(&self) -> Value {
        self.definition.function.parameters.clone()
    }

    fn to_definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
        let payload = serde_json::to_vec(&json!({ "name": self.name(), "arguments": args }))?;

        info!(tool = %self.name(), command = %self.argv.join(" "), "running tool command");

        let run = async {
            let mut child = Command::new(&self.argv[0])
                .args(&self.argv[1..])
                .current_dir(&self.cwd)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| anyhow::anyhow!("Failed to spawn '{}': {e}", self.argv[0]))?;

            // Stdin is fed while output drains, then closed
            let stdin = child.stdin.take();
            let feed = async move {
                if let Some(mut stdin) = stdin {
                    // A command that ignores stdin may exit before reading it
                    if let Err(e) = stdin.write_all(&payload).await {
                        debug!(tool = %self.name(), error = %e, "tool command did not read stdin");
                    }
                }
            };
            let ((), output) = tokio::join!(feed, child.wait_with_output());
            output.map_err(|e| anyhow::anyhow!("Command failed: {e}"))
        };

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(output) => output?,
            Err(_) => anyhow::bail!("timed out after {} seconds", self.timeout.as_secs()),
        };

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = skillbot_core::utils::truncate_string(stderr.trim(), MAX_STDERR_LEN);
            anyhow::bail!("exit code {code}: {stderr}");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        Ok(serde_json::from_str(stdout).unwrap_or_else(|_| Value::String(stdout.to_string())))
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
