//! Skillbot CLI — entry point.
//!
//! # Usage
//!
//! - `skillbot` — interactive REPL with persistent conversation history
//! - `skillbot -p "写个提交说明"` — single question, no history
//! - `skillbot --skills ssh,pdf-reader` — explicit skill selection
//! - `skillbot --list-skills` — print the discovered skills and exit

mod helpers;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use skillbot_agent::{CatalogReloader, ContextBuilder, ConversationLoop, PluginRegistry};
use skillbot_core::config::{load_config, Config};
use skillbot_core::HistoryStore;
use skillbot_providers::{create_provider, LlmRequestConfig};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🧩 Skillbot — AI chat client with pluggable Agent Skills
#[derive(Parser)]
#[command(name = "skillbot", version, about, long_about = None)]
struct Cli {
    /// Ask a single question (non-interactive)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Explicit skill names, comma separated ("all" activates every skill)
    #[arg(long)]
    skills: Option<String>,

    /// List discovered skills and exit
    #[arg(long, default_value_t = false)]
    list_skills: bool,

    /// Less output: no skill, tool, or stats lines
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Path to the config file (default: ~/.skillbot/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    logs: bool,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    let config = load_config(cli.config.as_deref());
    let project_root = std::env::current_dir().context("cannot determine the current directory")?;
    let registry = Arc::new(build_registry(&config, &project_root));

    if cli.list_skills {
        helpers::print_catalog(&registry.snapshot());
        return Ok(());
    }

    let agent = build_conversation_loop(&config, Arc::clone(&registry))?;
    let skills = cli.skills.as_deref().map(helpers::parse_skill_list).unwrap_or_default();

    let reloader = spawn_reloader(&config, &registry);

    let result = match cli.prompt {
        Some(prompt) => {
            info!(skills = ?skills, "processing single prompt");
            let outcome = repl::chat(&agent, &prompt, &skills, &[], cli.quiet).await;
            match outcome.abort_reason {
                Some(reason) if outcome.answer.is_empty() => Err(anyhow::anyhow!(reason)),
                _ => Ok(()),
            }
        }
        None => {
            let history = HistoryStore::open(None, config.agent.history_limit);
            repl::run(&agent, &skills, history, cli.quiet).await
        }
    };

    if let Some((reloader, handle)) = reloader {
        reloader.stop();
        let _ = handle.await;
    }

    result
}

// ─────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────

fn build_registry(config: &Config, project_root: &std::path::Path) -> PluginRegistry {
    let registry = PluginRegistry::builder()
        .from_config(&config.skills, project_root)
        .build();
    let catalog = registry.snapshot();
    info!(
        roots = ?registry.roots(),
        skills = catalog.len(),
        tools = catalog.tools().len(),
        "skills loaded"
    );
    registry
}

/// Build a `ConversationLoop` from the loaded configuration.
///
/// Fails when the configured provider is unknown or has no API key.
pub fn build_conversation_loop(config: &Config, registry: Arc<PluginRegistry>) -> Result<ConversationLoop> {
    let provider = create_provider(config)?;
    let request_config = LlmRequestConfig {
        max_tokens: config.agent.max_tokens,
        temperature: config.agent.temperature,
    };

    Ok(ConversationLoop::new(Arc::new(provider), registry)
        .with_model(config.resolved_model())
        .with_context(ContextBuilder::new(&config.agent.system_prompt))
        .with_request_config(request_config)
        .with_max_rounds(config.agent.max_tool_rounds))
}

fn spawn_reloader(
    config: &Config,
    registry: &Arc<PluginRegistry>,
) -> Option<(Arc<CatalogReloader>, tokio::task::JoinHandle<()>)> {
    let secs = config.skills.reload_interval_secs;
    if secs == 0 {
        return None;
    }
    let reloader = Arc::new(CatalogReloader::new(Arc::clone(registry), Duration::from_secs(secs)));
    let handle = {
        let reloader = Arc::clone(&reloader);
        tokio::spawn(async move { reloader.run().await })
    };
    Some((reloader, handle))
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("skillbot=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["skillbot", "-p", "hi", "--skills", "ssh,pdf", "-q", "--logs"]);
        assert_eq!(cli.prompt.as_deref(), Some("hi"));
        assert_eq!(cli.skills.as_deref(), Some("ssh,pdf"));
        assert!(cli.quiet && cli.logs && !cli.list_skills);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.providers.entry("deepseek").api_key.clear();
        config.skills.paths = vec![root.path().display().to_string()];
        let registry = Arc::new(build_registry(&config, root.path()));

        let err = build_conversation_loop(&config, registry).err().unwrap();
        assert!(err.to_string().contains("No API key"));
    }

    #[test]
    fn loop_takes_model_and_rounds_from_config() {
        let root = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.providers.entry("deepseek").api_key = "sk-test".into();
        config.agent.max_tool_rounds = 3;
        config.skills.paths = vec![root.path().display().to_string()];
        let registry = Arc::new(build_registry(&config, root.path()));

        let agent = build_conversation_loop(&config, registry).unwrap();
        assert_eq!(agent.model(), "deepseek-chat");
        assert_eq!(agent.max_rounds(), 3);
    }
}
