//! End-to-end turns over on-disk bundles with a scripted model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use skillbot_agent::registry::MANIFEST_FILE;
use skillbot_agent::{ConversationLoop, LoopState, PluginRegistry};
use skillbot_core::types::{Message, ToolDefinition, UsageInfo};
use skillbot_providers::{EventStream, LlmProvider, LlmRequestConfig, ProviderError, StreamEvent};

type Round = Vec<StreamEvent>;

/// What disappears from disk before the mid-turn reload.
enum Removal {
    /// Only the manifest, so the bundle directory stays usable.
    Manifest(PathBuf),
    /// The whole bundle directory.
    Bundle(PathBuf),
}

impl Removal {
    fn apply(&self) {
        match self {
            Removal::Manifest(dir) => std::fs::remove_file(dir.join(MANIFEST_FILE)).unwrap(),
            Removal::Bundle(dir) => std::fs::remove_dir_all(dir).unwrap(),
        }
    }
}

/// Plays back rounds; optionally reloads the registry after the first request.
struct Playback {
    rounds: Mutex<Vec<Round>>,
    seen_tools: Mutex<Vec<Vec<String>>>,
    reload_after_first: Option<(Arc<PluginRegistry>, Removal)>,
}

impl Playback {
    fn new(rounds: Vec<Round>) -> Self {
        Self {
            rounds: Mutex::new(rounds),
            seen_tools: Mutex::new(Vec::new()),
            reload_after_first: None,
        }
    }
}

#[async_trait]
impl LlmProvider for Playback {
    async fn chat_stream(
        &self,
        _messages: &[Message],
        tools: &[ToolDefinition],
        _model: &str,
        _config: &LlmRequestConfig,
    ) -> Result<EventStream, ProviderError> {
        let first = {
            let mut seen = self.seen_tools.lock().unwrap();
            seen.push(tools.iter().map(|t| t.name().to_string()).collect());
            seen.len() == 1
        };
        if let (true, Some((registry, removal))) = (first, &self.reload_after_first) {
            removal.apply();
            registry.reload().await;
        }

        let round = {
            let mut rounds = self.rounds.lock().unwrap();
            if rounds.is_empty() {
                vec![StreamEvent::TextDelta("done".into()), end(false)]
            } else {
                rounds.remove(0)
            }
        };
        let (tx, rx) = mpsc::channel(round.len());
        for event in round {
            tx.send(Ok(event)).await.unwrap();
        }
        Ok(rx)
    }

    fn default_model(&self) -> &str {
        "playback"
    }

    fn display_name(&self) -> &str {
        "Playback"
    }
}

fn end(tool_calls_requested: bool) -> StreamEvent {
    StreamEvent::Done {
        tool_calls_requested,
        finish_reason: None,
        usage: Some(UsageInfo {
            prompt_tokens: 3,
            completion_tokens: 2,
            total_tokens: 5,
        }),
    }
}

fn get_time_call(id: &str) -> StreamEvent {
    StreamEvent::ToolCallDelta {
        call_id: id.into(),
        name: Some("get_time".into()),
        arguments: "{}".into(),
    }
}

fn write_clock_bundle(root: &Path) {
    let dir = root.join("clock");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(MANIFEST_FILE),
        "---\nname: clock\ndescription: Report the current time\ntriggers: [time, 几点]\n---\nCall get_time, then answer in one sentence.",
    )
    .unwrap();
    let tools = json!({
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_time",
                "description": "Current wall-clock time",
                "parameters": {"type": "object", "properties": {}}
            }
        }],
        "dispatch": {
            "get_time": ["sh", "-c", "cat > /dev/null; echo '\"12:00\"'"]
        }
    });
    std::fs::write(dir.join("tools.json"), tools.to_string()).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_tool_turn_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    write_clock_bundle(root.path());
    let registry = Arc::new(PluginRegistry::builder().root(root.path()).build());

    let provider = Arc::new(Playback::new(vec![
        vec![get_time_call("call_1"), end(true)],
        vec![StreamEvent::TextDelta("It is 12:00".into()), end(false)],
    ]));
    let agent = ConversationLoop::new(provider.clone(), registry);

    let outcome = agent.run_turn("现在几点了", &[], &[]).await;

    assert_eq!(outcome.state, LoopState::Done);
    assert_eq!(outcome.answer, "It is 12:00");
    assert_eq!(outcome.skills_used, vec!["clock"]);
    assert_eq!(outcome.usage.total_tokens, 10);

    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("call_1"))
        .unwrap();
    let result: Value = serde_json::from_str(tool_msg.text().unwrap()).unwrap();
    assert_eq!(result, json!({"ok": true, "result": "12:00"}));
    assert_eq!(provider.seen_tools.lock().unwrap()[0], vec!["get_time"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_reload_mid_turn_keeps_turn_snapshot() {
    let root = tempfile::tempdir().unwrap();
    write_clock_bundle(root.path());
    let registry = Arc::new(PluginRegistry::builder().root(root.path()).build());

    let mut playback = Playback::new(vec![
        vec![get_time_call("call_1"), end(true)],
        vec![StreamEvent::TextDelta("It is 12:00".into()), end(false)],
    ]);
    playback.reload_after_first = Some((
        Arc::clone(&registry),
        Removal::Manifest(root.path().join("clock")),
    ));
    let provider = Arc::new(playback);
    let agent = ConversationLoop::new(provider.clone(), Arc::clone(&registry));

    // The bundle leaves the catalog and the registry reloads during round one
    let outcome = agent.run_turn("what time is it", &[], &[]).await;
    assert!(outcome.is_done());
    assert!(!registry.snapshot().contains("clock"));

    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("call_1"))
        .unwrap();
    let result: Value = serde_json::from_str(tool_msg.text().unwrap()).unwrap();
    assert_eq!(result["ok"], json!(true));

    // The next turn sees the new catalog
    let next = agent.run_turn("what time is it", &[], &[]).await;
    assert!(next.skills_used.is_empty());
    assert!(provider.seen_tools.lock().unwrap()[2].is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_vanished_bundle_dir_fails_only_the_tool_call() {
    let root = tempfile::tempdir().unwrap();
    write_clock_bundle(root.path());
    let registry = Arc::new(PluginRegistry::builder().root(root.path()).build());

    let mut playback = Playback::new(vec![
        vec![get_time_call("call_1"), end(true)],
        vec![StreamEvent::TextDelta("I could not read the clock.".into()), end(false)],
    ]);
    playback.reload_after_first = Some((
        Arc::clone(&registry),
        Removal::Bundle(root.path().join("clock")),
    ));
    let agent = ConversationLoop::new(Arc::new(playback), Arc::clone(&registry));

    let outcome = agent.run_turn("what time is it", &[], &[]).await;
    assert!(outcome.is_done());
    assert_eq!(outcome.answer, "I could not read the clock.");
    assert_eq!(outcome.rounds, 2);

    let tool_msg = outcome
        .messages
        .iter()
        .find(|m| m.tool_call_id() == Some("call_1"))
        .unwrap();
    let result: Value = serde_json::from_str(tool_msg.text().unwrap()).unwrap();
    assert_eq!(result["ok"], json!(false));
    let error = result["error"].as_str().unwrap();
    assert!(error.starts_with("tool 'get_time' failed"), "{error}");
}

#[tokio::test]
async fn test_explicit_unknown_skill_does_not_fail_turn() {
    let root = tempfile::tempdir().unwrap();
    let registry = Arc::new(PluginRegistry::builder().root(root.path()).build());
    let provider = Arc::new(Playback::new(vec![vec![
        StreamEvent::TextDelta("Hi.".into()),
        end(false),
    ]]));
    let agent = ConversationLoop::new(provider, registry);

    let outcome = agent.run_turn("hello", &["ghost".to_string()], &[]).await;
    assert!(outcome.is_done());
    assert!(outcome.skills_used.is_empty());
    assert_eq!(outcome.answer, "Hi.");
}
