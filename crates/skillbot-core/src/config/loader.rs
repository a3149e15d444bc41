//! Config loader — reads `~/.skillbot/config.json`, expands `${VAR}`
//! placeholders, and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.skillbot/config.json` (with `${VAR}` substitution)
//! 3. Environment variables `SKILLBOT_<SECTION>__<FIELD>` (override JSON)
//! 4. `DEEPSEEK_API_KEY` fills an empty `providers.deepseek.apiKey`

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path (or `path`) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let content = expand_env_placeholders(&content);

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Replace `${NAME}` with the value of env var `NAME`.
///
/// Unknown variables are left untouched so the mistake stays visible.
fn expand_env_placeholders(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `SKILLBOT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `SKILLBOT_AGENT__PROVIDER` → `agent.provider`
/// - `SKILLBOT_AGENT__MODEL` → `agent.model`
/// - `SKILLBOT_AGENT__MAX_TOKENS` → `agent.max_tokens`
/// - `SKILLBOT_AGENT__TEMPERATURE` → `agent.temperature`
/// - `SKILLBOT_AGENT__MAX_TOOL_ROUNDS` → `agent.max_tool_rounds`
/// - `SKILLBOT_PROVIDERS__<NAME>__API_KEY` → `providers.<name>.api_key`
/// - `SKILLBOT_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `SKILLBOT_SKILLS__PATHS` → `skills.paths` (comma-separated)
/// - `SKILLBOT_SKILLS__RELOAD_INTERVAL_SECS` → `skills.reload_interval_secs`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("SKILLBOT_AGENT__PROVIDER") {
        config.agent.provider = val;
    }
    if let Ok(val) = std::env::var("SKILLBOT_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Ok(val) = std::env::var("SKILLBOT_AGENT__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("SKILLBOT_AGENT__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.agent.temperature = t;
        }
    }
    if let Ok(val) = std::env::var("SKILLBOT_AGENT__MAX_TOOL_ROUNDS") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.max_tool_rounds = n;
        }
    }

    let names: Vec<String> = config.providers.names().iter().map(|n| n.to_string()).collect();
    for name in names {
        apply_provider_env(&mut config, &name);
    }

    if let Ok(val) = std::env::var("SKILLBOT_SKILLS__PATHS") {
        config.skills.paths = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Ok(val) = std::env::var("SKILLBOT_SKILLS__RELOAD_INTERVAL_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.skills.reload_interval_secs = n;
        }
    }

    if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
        let deepseek = config.providers.entry("deepseek");
        if deepseek.api_key.is_empty() {
            deepseek.api_key = key;
        }
    }

    config
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(config: &mut Config, name: &str) {
    let upper = name.to_uppercase();
    let provider = config.providers.entry(name);
    if let Ok(val) = std::env::var(format!("SKILLBOT_PROVIDERS__{upper}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("SKILLBOT_PROVIDERS__{upper}__API_BASE")) {
        provider.api_base = Some(val);
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.agent.max_tokens, 8192);
        assert_eq!(config.agent.max_tool_rounds, 8);
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "agent": { "maxTokens": 2048, "maxToolRounds": 4 },
            "skills": { "paths": ["skills"] }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tokens, 2048);
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert_eq!(config.skills.paths, vec!["skills"]);
        assert_eq!(config.agent.temperature, 0.7);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.agent.max_tokens, 8192);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.agent.max_tool_rounds = 5;
        config.providers.entry("openai").api_key = "sk-test".to_string();

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.agent.max_tool_rounds, 5);
        assert_eq!(reloaded.providers.get("openai").unwrap().api_key, "sk-test");
    }

    #[test]
    fn test_expand_env_placeholders() {
        std::env::set_var("SKILLBOT_TEST_PLACEHOLDER", "secret-value");
        let expanded = expand_env_placeholders(r#"{"apiKey": "${SKILLBOT_TEST_PLACEHOLDER}"}"#);
        assert_eq!(expanded, r#"{"apiKey": "secret-value"}"#);
        std::env::remove_var("SKILLBOT_TEST_PLACEHOLDER");
    }

    #[test]
    fn test_expand_env_placeholders_keeps_unknown() {
        let raw = "a ${SKILLBOT_SURELY_UNSET_VAR_XYZ} b ${unterminated";
        assert_eq!(expand_env_placeholders(raw), raw);
    }

    #[test]
    fn test_placeholder_in_config_file() {
        std::env::set_var("SKILLBOT_TEST_FILE_KEY", "from-env");
        let file = write_temp_json(
            r#"{"providers": {"local": {"apiKey": "${SKILLBOT_TEST_FILE_KEY}"}}}"#,
        );
        let config = load_config_from_path(file.path());
        assert_eq!(config.providers.get("local").unwrap().api_key, "from-env");
        std::env::remove_var("SKILLBOT_TEST_FILE_KEY");
    }

    #[test]
    fn test_env_override_max_rounds() {
        std::env::set_var("SKILLBOT_AGENT__MAX_TOOL_ROUNDS", "2");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.agent.max_tool_rounds, 2);
        std::env::remove_var("SKILLBOT_AGENT__MAX_TOOL_ROUNDS");
    }

    #[test]
    fn test_env_override_provider_key() {
        std::env::set_var("SKILLBOT_PROVIDERS__OPENAI__API_KEY", "sk-env-key");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.providers.get("openai").unwrap().api_key, "sk-env-key");
        std::env::remove_var("SKILLBOT_PROVIDERS__OPENAI__API_KEY");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["agent"].get("maxTokens").is_some());
        assert!(raw["agent"].get("max_tokens").is_none());
    }
}
