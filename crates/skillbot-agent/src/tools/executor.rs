//! Tool executor — resolves calls against one catalog snapshot and runs them.
//!
//! Every call yields exactly one [`ToolCallResult`]. Unknown tools, bad
//! arguments, tool errors and panics all become failure results that are
//! reported back to the model; none of them end the turn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use skillbot_core::types::ToolCall;

use crate::error::SkillError;
use crate::registry::Catalog;

use super::base::parse_arguments;

/// One call requested by the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    /// JSON-encoded arguments as streamed by the model.
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments: arguments.into(),
        }
    }
}

impl From<&ToolCall> for ToolCallRequest {
    fn from(call: &ToolCall) -> Self {
        Self::new(&call.id, &call.function.name, &call.function.arguments)
    }
}

/// The correlated outcome of one call.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    pub outcome: Result<Value, SkillError>,
    pub elapsed: Duration,
}

impl ToolCallResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Content of the tool message sent back to the model.
    pub fn to_message_content(&self) -> String {
        let body = match &self.outcome {
            Ok(result) => json!({ "ok": true, "result": result }),
            Err(e) => json!({ "ok": false, "error": e.to_string() }),
        };
        body.to_string()
    }
}

/// Runs tool calls against a fixed catalog snapshot.
#[derive(Clone, Debug)]
pub struct ToolExecutor {
    catalog: Arc<Catalog>,
}

impl ToolExecutor {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// Execute one call. Never fails; failures are carried in the result.
    pub async fn execute(&self, request: &ToolCallRequest) -> ToolCallResult {
        let started = Instant::now();
        let outcome = self.run(request).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(_) => info!(
                tool = %request.tool_name,
                call_id = %request.call_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "tool call succeeded"
            ),
            Err(e) => warn!(
                tool = %request.tool_name,
                call_id = %request.call_id,
                error = %e,
                "tool call failed"
            ),
        }

        ToolCallResult {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            outcome,
            elapsed,
        }
    }

    /// Execute a round concurrently; results follow request order.
    pub async fn execute_all(&self, requests: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        debug!(calls = requests.len(), "executing tool round");
        join_all(requests.iter().map(|r| self.execute(r))).await
    }

    async fn run(&self, request: &ToolCallRequest) -> Result<Value, SkillError> {
        let registered = self
            .catalog
            .tool(&request.tool_name)
            .ok_or_else(|| SkillError::UnknownTool(request.tool_name.clone()))?;

        let args = parse_arguments(&request.arguments)
            .map_err(|e| SkillError::execution(&request.tool_name, e.to_string()))?;

        // Spawned so a panicking tool is contained to its own task
        let callable = Arc::clone(&registered.callable);
        match tokio::spawn(async move { callable.execute(args).await }).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(SkillError::execution(&request.tool_name, format!("{e:#}"))),
            Err(join) if join.is_panic() => Err(SkillError::execution(&request.tool_name, "tool panicked")),
            Err(join) => Err(SkillError::execution(&request.tool_name, join.to_string())),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
