//! LLM Provider trait — the streaming model transport.
//!
//! Every backend implements [`LlmProvider::chat_stream`], which returns a
//! channel of [`StreamEvent`]s. The `HttpProvider` in `http_provider.rs` covers
//! all OpenAI-compatible APIs.

use async_trait::async_trait;
use skillbot_core::types::{Message, ToolDefinition, UsageInfo};
use tokio::sync::mpsc;

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

/// One incremental event from a streaming completion.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A fragment of a requested tool call.
    ///
    /// `name` is present on the first fragment of a call; `arguments` is a
    /// piece of the JSON-encoded argument string to be concatenated.
    ToolCallDelta {
        call_id: String,
        name: Option<String>,
        arguments: String,
    },
    /// End marker. Nothing follows.
    Done {
        tool_calls_requested: bool,
        finish_reason: Option<String>,
        usage: Option<UsageInfo>,
    },
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Receiving half of a streaming completion.
pub type EventStream = mpsc::Receiver<Result<StreamEvent, ProviderError>>;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start a streaming chat completion.
    ///
    /// # Arguments
    /// * `messages` — Conversation in OpenAI format.
    /// * `tools`    — Tool definitions the model may call (empty = none).
    /// * `model`    — Model identifier (e.g. `"deepseek-chat"`).
    /// * `config`   — Temperature, max_tokens, etc.
    ///
    /// # Returns
    /// A receiver yielding events until [`StreamEvent::Done`]. A channel that
    /// closes before `Done` means the stream was cut short.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<EventStream, ProviderError>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
