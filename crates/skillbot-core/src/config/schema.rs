//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `providers` map, `SkillsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Base persona used when no skill contributes instructions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个智能助手。请用中文回答。";

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.skillbot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub providers: ProvidersConfig,
    pub skills: SkillsConfig,
}

impl Config {
    /// The config of the provider selected by `agent.provider`.
    pub fn active_provider(&self) -> Option<&ProviderConfig> {
        self.providers.get(&self.agent.provider)
    }

    /// The model to use: the provider's own model, else `agent.model`.
    pub fn resolved_model(&self) -> String {
        self.active_provider()
            .and_then(|p| p.model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.agent.model.clone())
    }
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Conversation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Name of the provider entry in `providers` to talk to.
    pub provider: String,
    /// Fallback model identifier when the provider entry names none.
    pub model: String,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Maximum model requests per turn before the turn is aborted.
    pub max_tool_rounds: u32,
    /// Base persona text placed ahead of any skill instructions.
    pub system_prompt: String,
    /// User/assistant entries kept in the CLI conversation history.
    pub history_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            max_tokens: 8192,
            temperature: 0.7,
            max_tool_rounds: 8,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: 20,
        }
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single OpenAI-compatible endpoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for Bearer authentication.
    pub api_key: String,
    /// API base URL (e.g. `https://api.deepseek.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Model served by this provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Provider entries keyed by name. Sorted so saved files are stable.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(pub BTreeMap<String, ProviderConfig>);

impl Default for ProvidersConfig {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            "deepseek".to_string(),
            ProviderConfig {
                api_base: Some("https://api.deepseek.com".to_string()),
                model: Some("deepseek-chat".to_string()),
                ..Default::default()
            },
        );
        map.insert(
            "openai".to_string(),
            ProviderConfig {
                api_base: Some("https://api.openai.com/v1".to_string()),
                model: Some("gpt-4o-mini".to_string()),
                ..Default::default()
            },
        );
        Self(map)
    }
}

impl ProvidersConfig {
    /// Get a provider config by name (e.g. `"deepseek"`).
    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.0.get(name)
    }

    /// Get or insert a provider config by name.
    pub fn entry(&mut self, name: &str) -> &mut ProviderConfig {
        self.0.entry(name.to_string()).or_default()
    }

    /// Provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

// ─────────────────────────────────────────────
// Skills
// ─────────────────────────────────────────────

/// Skill discovery and selection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillsConfig {
    /// Ordered skill roots. Later roots override earlier ones by name.
    ///
    /// Keys: `skills` (`<project>/skills`), `project`
    /// (`<project>/.cursor/skills`), `personal` (`~/.cursor/skills`),
    /// or a literal path.
    pub paths: Vec<String>,
    /// Skills activated when no explicit selection is given.
    /// Empty means automatic trigger matching.
    pub defaults: Vec<String>,
    /// Seconds between background reload checks (0 disables).
    pub reload_interval_secs: u64,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            paths: vec!["skills".to_string(), "project".to_string(), "personal".to_string()],
            defaults: Vec::new(),
            reload_interval_secs: 0,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
