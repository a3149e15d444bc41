//! Server-sent events decoding for OpenAI-compatible streaming responses.
//!
//! Two layers:
//! - [`SseDecoder`] splits the raw byte stream into `data:` payloads.
//! - [`ChunkMapper`] turns each JSON chunk into [`StreamEvent`]s, mapping the
//!   provider's per-index tool-call fragments onto stable call ids.

use std::collections::HashMap;

use serde::Deserialize;
use skillbot_core::types::UsageInfo;

use crate::traits::{ProviderError, StreamEvent};

// ─────────────────────────────────────────────
// Line decoding
// ─────────────────────────────────────────────

/// One decoded SSE payload.
#[derive(Debug, PartialEq)]
pub enum SseData {
    /// A `data: {...}` line.
    Chunk(String),
    /// The `data: [DONE]` terminator.
    Done,
}

/// Incremental SSE line decoder.
///
/// Bytes are buffered until a full line is available, so multi-byte UTF-8
/// sequences split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every complete payload now available.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            // Blank separators and `:` comments carry nothing
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    out.push(SseData::Done);
                } else if !data.is_empty() {
                    out.push(SseData::Chunk(data.to_string()));
                }
            }
        }

        out
    }
}

// ─────────────────────────────────────────────
// Chunk mapping
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Maps streamed JSON chunks to [`StreamEvent`]s for a single response.
#[derive(Debug, Default)]
pub struct ChunkMapper {
    /// Provider tool-call index → call id.
    call_ids: HashMap<u32, String>,
    finish_reason: Option<String>,
    usage: Option<UsageInfo>,
}

impl ChunkMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one `data:` payload.
    pub fn map(&mut self, data: &str) -> Result<Vec<StreamEvent>, ProviderError> {
        let chunk: StreamResponse = serde_json::from_str(data)
            .map_err(|e| ProviderError::Serialization(format!("bad stream chunk: {e}")))?;

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }

            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(StreamEvent::TextDelta(text));
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let call_id = self
                    .call_ids
                    .entry(tc.index)
                    .or_insert_with(|| {
                        tc.id
                            .clone()
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| format!("call_{}", tc.index))
                    })
                    .clone();

                let (name, arguments) = match tc.function {
                    Some(f) => (f.name.filter(|n| !n.is_empty()), f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };

                events.push(StreamEvent::ToolCallDelta {
                    call_id,
                    name,
                    arguments,
                });
            }
        }

        Ok(events)
    }

    /// Produce the end marker once `[DONE]` has been seen.
    pub fn finish(self) -> StreamEvent {
        StreamEvent::Done {
            tool_calls_requested: !self.call_ids.is_empty(),
            finish_reason: self.finish_reason,
            usage: self.usage,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
