//! Streaming LLM provider layer for Skillbot.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — trait that all providers implement
//! - [`stream`] — SSE decoding and tool-call delta mapping
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible streaming client
//! - [`http_provider::create_provider`] — convenience builder from config

pub mod http_provider;
pub mod stream;
pub mod traits;

// Re-export main types for convenience
pub use http_provider::{create_provider, HttpProvider};
pub use traits::{EventStream, LlmProvider, LlmRequestConfig, ProviderError, StreamEvent};
