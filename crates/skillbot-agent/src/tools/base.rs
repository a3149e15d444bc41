//! Tool trait — the capability every bundle tool implements.
//!
//! Tools are grouped into a [`ToolModule`](super::module::ToolModule) per
//! bundle and looked up by name in the catalog. No reflection is involved.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use skillbot_core::types::ToolDefinition;

/// Structured key → value arguments of one call.
pub type ToolArgs = HashMap<String, Value>;

// ─────────────────────────────────────────────
// Tool trait
// ─────────────────────────────────────────────

/// A callable exposed to the model.
///
/// The loop sends `to_definition()` to the model and dispatches calls via
/// `execute()`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used by the model to call this tool (e.g. `"get_time"`).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the parameters.
    ///
    /// Should be `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    /// Execute the tool with the given arguments.
    ///
    /// The returned payload is sent back to the model as JSON. An `Err`
    /// becomes a failure result; it never aborts the turn.
    async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value>;

    /// Build the `ToolDefinition` sent to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Extract a required `String` param, returning a user-friendly error.
pub fn require_string(args: &ToolArgs, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Missing required parameter: {key}"))
}

/// Extract an optional `String` param.
pub fn optional_string(args: &ToolArgs, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Parse the model's JSON argument string into an object.
///
/// An empty string is treated as `{}`.
pub fn parse_arguments(raw: &str) -> anyhow::Result<ToolArgs> {
    if raw.trim().is_empty() {
        return Ok(ToolArgs::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => anyhow::bail!("arguments must be a JSON object, got: {other}"),
        Err(e) => anyhow::bail!("arguments are not valid JSON: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_require_string() {
        let mut args = ToolArgs::new();
        args.insert("tz".into(), json!("UTC"));
        assert_eq!(require_string(&args, "tz").unwrap(), "UTC");
        assert!(require_string(&args, "missing").is_err());

        args.insert("n".into(), json!(42));
        assert!(require_string(&args, "n").is_err());
        assert_eq!(optional_string(&args, "n"), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert!(parse_arguments("").unwrap().is_empty());
        assert_eq!(parse_arguments(r#"{"a":1}"#).unwrap()["a"], json!(1));
        assert!(parse_arguments("[1,2]").is_err());
        assert!(parse_arguments("{oops").is_err());
    }

    #[tokio::test]
    async fn test_to_definition_default() {
        struct DummyTool;

        #[async_trait]
        impl Tool for DummyTool {
            fn name(&self) -> &str { "dummy" }
            fn description(&self) -> &str { "A test tool" }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {"msg": {"type": "string"}}})
            }
            async fn execute(&self, args: ToolArgs) -> anyhow::Result<Value> {
                Ok(json!({ "echo": require_string(&args, "msg")? }))
            }
        }

        let def = DummyTool.to_definition();
        assert_eq!(def.function.name, "dummy");
        assert_eq!(def.tool_type, "function");

        let mut args = ToolArgs::new();
        args.insert("msg".into(), json!("hi"));
        assert_eq!(DummyTool.execute(args).await.unwrap(), json!({"echo": "hi"}));
    }
}
