//! Generic streaming HTTP provider for OpenAI-compatible APIs.
//!
//! Talks to any `/chat/completions` endpoint with `stream: true` and decodes
//! the SSE response on a background task.
//!
//! Covers: DeepSeek, OpenAI, and any self-hosted OpenAI-compatible server.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use skillbot_core::config::{Config, ProviderConfig};
use skillbot_core::types::{ChatCompletionRequest, Message, StreamOptions, ToolDefinition};

use crate::stream::{ChunkMapper, SseData, SseDecoder};
use crate::traits::{EventStream, LlmProvider, LlmRequestConfig, ProviderError};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest silence tolerated between reads of a response.
const READ_TIMEOUT: Duration = Duration::from_secs(300);
const EVENT_BUFFER: usize = 64;

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// A streaming LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// Provider name from config (e.g. `"deepseek"`).
    name: String,
    /// API base URL (e.g. `"https://api.deepseek.com"`).
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// Default model for this provider instance.
    default_model: String,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider from a named provider config.
    ///
    /// # Arguments
    /// * `name`   — Provider name, used for logging
    /// * `config` — api_key, api_base, extra_headers
    /// * `model`  — The default model to use
    pub fn new(name: &str, config: &ProviderConfig, model: &str) -> Result<Self, ProviderError> {
        let api_base = config
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        Ok(HttpProvider {
            client: build_client(READ_TIMEOUT)?,
            name: name.to_string(),
            api_base,
            api_key: config.api_key.clone(),
            default_model: model.to_string(),
            extra_headers,
        })
    }

    /// Replace the idle read timeout (default 300 s).
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Result<Self, ProviderError> {
        self.client = build_client(read_timeout)?;
        Ok(self)
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

fn build_client(read_timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .build()
        .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<EventStream, ProviderError> {
        debug!(
            provider = %self.name,
            model = %model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling LLM (streaming)"
        );

        let has_tools = !tools.is_empty();
        let request_body = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: has_tools.then(|| tools.to_vec()),
            tool_choice: has_tools.then(|| "auto".to_string()),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            stream: true,
            stream_options: Some(StreamOptions { include_usage: true }),
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .headers(self.extra_headers.clone())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.name, error = %e, "HTTP request failed");
                ProviderError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(provider = %self.name, status = %status, body = %body, "API error");
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut mapper = ChunkMapper::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for data in decoder.push(&chunk) {
                    match data {
                        SseData::Done => {
                            let _ = tx.send(Ok(mapper.finish())).await;
                            return;
                        }
                        SseData::Chunk(json) => match mapper.map(&json) {
                            Ok(events) => {
                                for event in events {
                                    if tx.send(Ok(event)).await.is_err() {
                                        debug!(provider = %provider_name, "stream receiver dropped");
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(provider = %provider_name, error = %e, "Malformed stream chunk");
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        },
                    }
                }
            }

            let _ = tx
                .send(Err(ProviderError::StreamInterrupted(
                    "stream ended without [DONE]".to_string(),
                )))
                .await;
        });

        Ok(rx)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build the HttpProvider selected by `agent.provider`.
///
/// Fails when the provider is unknown or has no API key.
pub fn create_provider(config: &Config) -> anyhow::Result<HttpProvider> {
    let name = config.agent.provider.as_str();
    let Some(provider) = config.active_provider() else {
        bail!(
            "Unknown provider '{}'. Configured providers: {}",
            name,
            config.providers.names().join(", ")
        );
    };
    if !provider.is_configured() {
        bail!(
            "No API key for provider '{}'. Set DEEPSEEK_API_KEY or SKILLBOT_PROVIDERS__{}__API_KEY.",
            name,
            name.to_uppercase()
        );
    }

    let model = config.resolved_model();
    debug!(
        provider = name,
        model = %model,
        api_base = provider.api_base.as_deref().unwrap_or("default"),
        "Creating LLM provider"
    );

    HttpProvider::new(name, provider, &model).context("failed to create LLM provider")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StreamEvent;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(api_key: &str, api_base: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            api_key: api_key.to_string(),
            api_base: api_base.map(String::from),
            model: None,
            extra_headers: None,
        }
    }

    fn sse(lines: &[&str]) -> String {
        lines.iter().map(|l| format!("data: {l}\n\n")).collect()
    }

    async fn collect(mut rx: EventStream) -> Vec<Result<StreamEvent, ProviderError>> {
        let mut out = Vec::new();
        while let Some(ev) = rx.recv().await {
            out.push(ev);
        }
        out
    }

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let config = make_config("key", Some("https://api.deepseek.com/"));
        let provider = HttpProvider::new("deepseek", &config, "deepseek-chat").unwrap();
        assert_eq!(
            provider.completions_url(),
            "https://api.deepseek.com/chat/completions"
        );
    }

    #[test]
    fn test_default_api_base() {
        let provider = HttpProvider::new("custom", &make_config("key", None), "m").unwrap();
        assert_eq!(provider.api_base, DEFAULT_API_BASE);
        assert_eq!(provider.display_name(), "custom");
        assert_eq!(provider.default_model(), "m");
    }

    #[test]
    fn test_extra_headers() {
        let mut headers = HashMap::new();
        headers.insert("X-App-Code".to_string(), "my-app-code".to_string());
        let config = ProviderConfig {
            extra_headers: Some(headers),
            ..make_config("key", None)
        };
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini").unwrap();
        assert!(provider.extra_headers.contains_key("x-app-code"));
    }

    #[test]
    fn test_create_provider_requires_key() {
        let mut config = Config::default();
        config.providers.entry("deepseek").api_key = String::new();
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("No API key"));

        config.agent.provider = "nope".to_string();
        assert!(create_provider(&config).unwrap_err().to_string().contains("Unknown provider"));
    }

    #[test]
    fn test_create_provider_uses_active_entry() {
        let mut config = Config::default();
        config.providers.entry("deepseek").api_key = "sk-ds".to_string();
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.display_name(), "deepseek");
        assert_eq!(provider.default_model(), "deepseek-chat");
    }

    // ── Integration tests with mock server ──

    #[tokio::test]
    async fn test_stream_text_and_usage() {
        let mock_server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#,
            r#"{"choices":[{"delta":{"content":" there"},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
            "[DONE]",
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .and(body_partial_json(serde_json::json!({"stream": true, "model": "deepseek-chat"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let config = make_config("test-key-123", Some(&mock_server.uri()));
        let provider = HttpProvider::new("deepseek", &config, "deepseek-chat").unwrap();

        let rx = provider
            .chat_stream(&[Message::user("Hi")], &[], "deepseek-chat", &LlmRequestConfig::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = collect(rx).await.into_iter().map(|e| e.unwrap()).collect();

        assert_eq!(events[0], StreamEvent::TextDelta("Hello".into()));
        assert_eq!(events[1], StreamEvent::TextDelta(" there".into()));
        match &events[2] {
            StreamEvent::Done { tool_calls_requested, finish_reason, usage } => {
                assert!(!tool_calls_requested);
                assert_eq!(finish_reason.as_deref(), Some("stop"));
                assert_eq!(usage.unwrap().total_tokens, 15);
            }
            other => panic!("expected Done, got {other:?}"),
        }
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_stream_tool_call_deltas() {
        let mock_server = MockServer::start().await;
        let body = sse(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_time","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"tool_choice": "auto"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini").unwrap();
        let tool = ToolDefinition::new("get_time", "Current time", serde_json::json!({"type": "object"}));

        let rx = provider
            .chat_stream(&[Message::user("time?")], &[tool], "gpt-4o-mini", &LlmRequestConfig::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = collect(rx).await.into_iter().map(|e| e.unwrap()).collect();

        assert_eq!(
            events[0],
            StreamEvent::ToolCallDelta {
                call_id: "call_1".into(),
                name: Some("get_time".into()),
                arguments: String::new(),
            }
        );
        assert!(matches!(
            &events[2],
            StreamEvent::Done { tool_calls_requested: true, finish_reason: Some(r), .. } if r == "tool_calls"
        ));
    }

    #[tokio::test]
    async fn test_stream_without_done_is_interrupted() {
        let mock_server = MockServer::start().await;
        let body = sse(&[r#"{"choices":[{"delta":{"content":"partial"}}]}"#]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&mock_server)
            .await;

        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini").unwrap();
        let rx = provider
            .chat_stream(&[Message::user("x")], &[], "gpt-4o-mini", &LlmRequestConfig::default())
            .await
            .unwrap();
        let events = collect(rx).await;

        assert!(matches!(events[0], Ok(StreamEvent::TextDelta(_))));
        assert!(matches!(events.last(), Some(Err(ProviderError::StreamInterrupted(_)))));
    }

    #[tokio::test]
    async fn test_api_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Rate limit exceeded"))
            .mount(&mock_server)
            .await;

        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini").unwrap();
        let err = provider
            .chat_stream(&[Message::user("Hello")], &[], "gpt-4o-mini", &LlmRequestConfig::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::Api { status, body } => {
                assert_eq!(status, 429);
                assert!(body.contains("Rate limit"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stalled_server_hits_read_timeout() {
        let mock_server = MockServer::start().await;
        let body = sse(&[r#"{"choices":[{"delta":{"content":"late"},"finish_reason":"stop"}]}"#, "[DONE]"]);

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let config = make_config("key", Some(&mock_server.uri()));
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini")
            .unwrap()
            .with_read_timeout(Duration::from_millis(200))
            .unwrap();
        let outcome = provider
            .chat_stream(&[Message::user("Hello")], &[], "gpt-4o-mini", &LlmRequestConfig::default())
            .await;
        assert!(matches!(outcome, Err(ProviderError::Network(_))));
    }

    #[tokio::test]
    async fn test_network_error() {
        let config = make_config("key", Some("http://127.0.0.1:1"));
        let provider = HttpProvider::new("openai", &config, "gpt-4o-mini").unwrap();
        let err = provider
            .chat_stream(&[Message::user("Hello")], &[], "gpt-4o-mini", &LlmRequestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
