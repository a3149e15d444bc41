//! Conversation loop — the multi-round, streaming tool-calling turn.
//!
//! One call to [`ConversationLoop::run_turn`] handles one user message:
//! 1. Capture a catalog snapshot for the whole turn
//! 2. Select skills and render the context
//! 3. Stream the model reply, accumulating tool-call fragments
//! 4. Execute the round's tool calls and feed results back
//! 5. Repeat until the model answers in plain text or a limit is hit

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use skillbot_core::types::{Message, ToolCall, ToolDefinition, UsageInfo};
use skillbot_providers::{LlmProvider, LlmRequestConfig, StreamEvent};

use crate::context::ContextBuilder;
use crate::error::SkillError;
use crate::registry::PluginRegistry;
use crate::selector::select;
use crate::tools::{ToolCallRequest, ToolExecutor};

/// Default number of model requests allowed per turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 8;

/// Sink for incremental turn events.
pub type TurnEventSink = mpsc::UnboundedSender<TurnEvent>;

// ─────────────────────────────────────────────
// Turn state and events
// ─────────────────────────────────────────────

/// Where the loop is within a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    AwaitingModel,
    ExecutingTools,
    Done,
    Aborted,
}

/// Progress reported while a turn runs.
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    /// Bundles activated for this turn, in catalog order.
    SkillsActivated(Vec<String>),
    /// A fragment of assistant text as it streams in.
    TextDelta(String),
    ToolStarted {
        round: u32,
        call_id: String,
        tool_name: String,
    },
    ToolFinished {
        round: u32,
        call_id: String,
        tool_name: String,
        success: bool,
        elapsed: Duration,
        /// The JSON content sent back to the model.
        content: String,
    },
    RoundCompleted {
        round: u32,
        tool_calls: usize,
    },
}

/// Everything the caller gets back from one turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Final answer when `Done`; text streamed so far when `Aborted`.
    pub answer: String,
    /// `Done` or `Aborted`.
    pub state: LoopState,
    pub abort_reason: Option<SkillError>,
    pub skills_used: Vec<String>,
    /// Token usage summed over every model request of the turn.
    pub usage: UsageInfo,
    /// Number of model requests made.
    pub rounds: u32,
    pub elapsed: Duration,
    /// The full message list, including tool calls and results.
    pub messages: Vec<Message>,
}

impl TurnOutcome {
    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }
}

// ─────────────────────────────────────────────
// Streaming accumulator
// ─────────────────────────────────────────────

/// Buffers tool-call fragments per call id until the stream ends.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    order: Vec<String>,
    pending: HashMap<String, PendingCall>,
}

#[derive(Debug, Default)]
struct PendingCall {
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn push(&mut self, call_id: String, name: Option<String>, fragment: &str) {
        if !self.pending.contains_key(&call_id) {
            self.order.push(call_id.clone());
        }
        let call = self.pending.entry(call_id).or_default();
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            call.name = name;
        }
        call.arguments.push_str(fragment);
    }

    /// Completed calls in first-seen order.
    fn finish(mut self) -> Vec<ToolCall> {
        self.order
            .into_iter()
            .filter_map(|id| {
                let call = self.pending.remove(&id)?;
                Some(ToolCall::new(id, call.name, call.arguments))
            })
            .collect()
    }
}

/// One fully received model reply.
struct ModelReply {
    text: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<UsageInfo>,
    finish_reason: Option<String>,
}

/// How a streamed request ended early.
struct StreamFailure {
    error: SkillError,
    partial_text: String,
}

// ─────────────────────────────────────────────
// ConversationLoop
// ─────────────────────────────────────────────

/// Drives turns against a provider and a plugin registry.
pub struct ConversationLoop {
    /// Model transport.
    provider: Arc<dyn LlmProvider>,
    /// Skill catalog source; one snapshot is taken per turn.
    registry: Arc<PluginRegistry>,
    context: ContextBuilder,
    /// Model identifier sent with every request.
    model: String,
    request_config: LlmRequestConfig,
    max_rounds: u32,
}

impl ConversationLoop {
    /// Create a loop using the provider's default model.
    pub fn new(provider: Arc<dyn LlmProvider>, registry: Arc<PluginRegistry>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            registry,
            context: ContextBuilder::default(),
            model,
            request_config: LlmRequestConfig::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_context(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    pub fn with_request_config(mut self, config: LlmRequestConfig) -> Self {
        self.request_config = config;
        self
    }

    /// Cap on model requests per turn. Zero is treated as one.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Run one turn without an event sink or cancellation.
    pub async fn run_turn(&self, user_text: &str, explicit_skills: &[String], history: &[Message]) -> TurnOutcome {
        self.run_turn_with(user_text, explicit_skills, history, None, &CancellationToken::new())
            .await
    }

    /// Run one turn, reporting progress to `events` and honoring `cancel`.
    pub async fn run_turn_with(
        &self,
        user_text: &str,
        explicit_skills: &[String],
        history: &[Message],
        events: Option<&TurnEventSink>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let started = Instant::now();
        let catalog = self.registry.snapshot();

        let selection = select(user_text, &catalog, explicit_skills);
        emit(events, TurnEvent::SkillsActivated(selection.names.clone()));

        let rendered = self.context.render(&catalog, &selection.names);
        let mut messages = self.context.build_messages(&rendered, history, user_text);
        let executor = ToolExecutor::new(Arc::clone(&catalog));

        info!(
            model = %self.model,
            skills = ?selection.names,
            tools = rendered.tool_schemas.len(),
            "turn started"
        );

        let mut usage = UsageInfo::default();
        let mut transcript: Vec<String> = Vec::new();
        let mut rounds = 0u32;

        let abort = |reason: SkillError, transcript: Vec<String>, messages: Vec<Message>, usage: UsageInfo, rounds: u32| {
            warn!(error = %reason, rounds = rounds, "turn aborted");
            TurnOutcome {
                answer: transcript.join("\n"),
                state: LoopState::Aborted,
                abort_reason: Some(reason),
                skills_used: selection.names.clone(),
                usage,
                rounds,
                elapsed: started.elapsed(),
                messages,
            }
        };

        while rounds < self.max_rounds {
            if cancel.is_cancelled() {
                return abort(SkillError::Cancelled, transcript, messages, usage, rounds);
            }

            rounds += 1;
            debug!(round = rounds, state = ?LoopState::AwaitingModel, "requesting model");

            let reply = match self
                .stream_reply(&messages, &rendered.tool_schemas, events, cancel)
                .await
            {
                Ok(reply) => reply,
                Err(failure) => {
                    if !failure.partial_text.is_empty() {
                        transcript.push(failure.partial_text);
                    }
                    return abort(failure.error, transcript, messages, usage, rounds);
                }
            };

            if let Some(u) = reply.usage {
                usage += u;
            }

            if reply.tool_calls.is_empty() {
                messages.push(Message::assistant(&reply.text));
                info!(
                    rounds = rounds,
                    finish_reason = reply.finish_reason.as_deref().unwrap_or("stop"),
                    total_tokens = usage.total_tokens,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "turn completed"
                );
                return TurnOutcome {
                    answer: reply.text,
                    state: LoopState::Done,
                    abort_reason: None,
                    skills_used: selection.names.clone(),
                    usage,
                    rounds,
                    elapsed: started.elapsed(),
                    messages,
                };
            }

            if !reply.text.is_empty() {
                transcript.push(reply.text.clone());
            }

            debug!(round = rounds, calls = reply.tool_calls.len(), state = ?LoopState::ExecutingTools, "executing tool calls");
            let requests: Vec<ToolCallRequest> = reply.tool_calls.iter().map(ToolCallRequest::from).collect();
            messages.push(Message::assistant_tool_calls(Some(reply.text), reply.tool_calls));

            for request in &requests {
                emit(
                    events,
                    TurnEvent::ToolStarted {
                        round: rounds,
                        call_id: request.call_id.clone(),
                        tool_name: request.tool_name.clone(),
                    },
                );
            }

            let results = executor.execute_all(&requests).await;

            for result in &results {
                let content = result.to_message_content();
                emit(
                    events,
                    TurnEvent::ToolFinished {
                        round: rounds,
                        call_id: result.call_id.clone(),
                        tool_name: result.tool_name.clone(),
                        success: result.is_success(),
                        elapsed: result.elapsed,
                        content: content.clone(),
                    },
                );
                messages.push(Message::tool_result(&result.call_id, content));
            }

            emit(
                events,
                TurnEvent::RoundCompleted {
                    round: rounds,
                    tool_calls: results.len(),
                },
            );
        }

        abort(
            SkillError::ToolLoopExceeded {
                max_rounds: self.max_rounds,
            },
            transcript,
            messages,
            usage,
            rounds,
        )
    }

    /// Stream one model request to its end marker.
    async fn stream_reply(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        events: Option<&TurnEventSink>,
        cancel: &CancellationToken,
    ) -> Result<ModelReply, StreamFailure> {
        let mut text = String::new();
        let mut rx = match self
            .provider
            .chat_stream(messages, tools, &self.model, &self.request_config)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                return Err(StreamFailure {
                    error: e.into(),
                    partial_text: text,
                })
            }
        };

        let mut calls = ToolCallAccumulator::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StreamFailure { error: SkillError::Cancelled, partial_text: text });
                }
                next = rx.recv() => next,
            };

            match next {
                Some(Ok(StreamEvent::TextDelta(delta))) => {
                    text.push_str(&delta);
                    emit(events, TurnEvent::TextDelta(delta));
                }
                Some(Ok(StreamEvent::ToolCallDelta {
                    call_id,
                    name,
                    arguments,
                })) => calls.push(call_id, name, &arguments),
                Some(Ok(StreamEvent::Done {
                    tool_calls_requested,
                    finish_reason,
                    usage,
                })) => {
                    let tool_calls = calls.finish();
                    if tool_calls_requested && tool_calls.is_empty() {
                        warn!("model signalled tool calls but sent none");
                    }
                    return Ok(ModelReply {
                        text,
                        tool_calls,
                        usage,
                        finish_reason,
                    });
                }
                Some(Err(e)) => {
                    return Err(StreamFailure {
                        error: e.into(),
                        partial_text: text,
                    })
                }
                None => {
                    return Err(StreamFailure {
                        error: SkillError::ModelUnavailable("stream closed before completion".into()),
                        partial_text: text,
                    })
                }
            }
        }
    }
}

fn emit(sink: Option<&TurnEventSink>, event: TurnEvent) {
    if let Some(sink) = sink {
        // A dropped receiver only means nobody is watching
        let _ = sink.send(event);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
