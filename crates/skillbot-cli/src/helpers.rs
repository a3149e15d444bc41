//! Shared CLI helpers — colored output, tool previews, turn stats.

use std::time::Duration;

use colored::Colorize;
use regex::Regex;

use skillbot_agent::registry::Catalog;
use skillbot_agent::{SkillError, TurnOutcome};
use skillbot_core::utils::truncate_string;

/// Maximum characters of a tool result shown in the terminal.
const PREVIEW_LEN: usize = 200;

const SENSITIVE_KEYS: &str = r#""(password|passwd|secret|token|access_token|api_key)"\s*:\s*"[^"]*""#;

/// Print the banner shown at REPL start.
pub fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "🧩 Skillbot".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a message, /reload to rescan skills, /clear to forget history, \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print the label that precedes a streamed answer.
pub fn print_answer_header() {
    println!();
    print!("{} ", "🧩 Skillbot:".cyan().bold());
}

/// Print the skills activated for a turn.
pub fn print_skills(names: &[String]) {
    if names.is_empty() {
        return;
    }
    eprintln!("{} {}", "skills:".dimmed(), names.join(", ").yellow());
}

/// Print a one-line tool outcome.
pub fn print_tool_finished(tool_name: &str, success: bool, elapsed: Duration) {
    let mark = if success { "✓".green() } else { "✗".red() };
    eprintln!(
        "{} {} {}",
        mark,
        tool_name.bold(),
        format!("({} ms)", elapsed.as_millis()).dimmed()
    );
}

/// Print a masked, truncated preview of a tool result message.
pub fn print_tool_preview(content: &str) {
    eprintln!("  {}", tool_preview(content).dimmed());
}

/// Hide credential values and shorten the text for display.
pub fn tool_preview(content: &str) -> String {
    let masked = match Regex::new(SENSITIVE_KEYS).ok() {
        Some(re) => re.replace_all(content, r#""$1":"***""#).into_owned(),
        None => content.replace("password", "***"),
    };
    truncate_string(&masked, PREVIEW_LEN)
}

/// Print the end-of-turn line: abort reason (if any) and stats.
pub fn print_outcome(outcome: &TurnOutcome, quiet: bool) {
    println!();
    if let Some(reason) = &outcome.abort_reason {
        eprintln!("{} {}", "⚠".yellow(), abort_message(reason).yellow());
    }
    if !quiet {
        eprintln!("{}", stats_line(outcome).dimmed());
    }
    println!();
}

fn abort_message(reason: &SkillError) -> String {
    match reason {
        SkillError::ToolLoopExceeded { max_rounds } => {
            format!("Stopped after {max_rounds} rounds of tool calls; the answer may be incomplete.")
        }
        SkillError::ModelUnavailable(detail) => format!("The model is unavailable: {detail}"),
        SkillError::Cancelled => "Turn cancelled.".to_string(),
        other => other.to_string(),
    }
}

/// `elapsed 1.2s · 3 rounds · 120 tokens (100 prompt + 20 completion)`
pub fn stats_line(outcome: &TurnOutcome) -> String {
    let usage = &outcome.usage;
    format!(
        "elapsed {:.1}s · {} round{} · {} tokens ({} prompt + {} completion)",
        outcome.elapsed.as_secs_f64(),
        outcome.rounds,
        if outcome.rounds == 1 { "" } else { "s" },
        usage.total_tokens,
        usage.prompt_tokens,
        usage.completion_tokens
    )
}

/// Print the catalog for `--list-skills`.
pub fn print_catalog(catalog: &Catalog) {
    if catalog.is_empty() {
        println!("{}", "No skills found.".dimmed());
    }
    for bundle in catalog.bundles() {
        let tools: Vec<&str> = catalog
            .tools_of(&bundle.name)
            .map(|t| t.spec.tool_name.as_str())
            .collect();
        println!("{}  {}", bundle.name.cyan().bold(), bundle.description);
        if !bundle.triggers.is_empty() {
            println!("    {} {}", "triggers:".dimmed(), bundle.triggers.join(", "));
        }
        if !tools.is_empty() {
            println!("    {} {}", "tools:".dimmed(), tools.join(", "));
        }
        println!("    {}", bundle.path.display().to_string().dimmed());
    }
    for diagnostic in catalog.diagnostics() {
        eprintln!("{} {}", "⚠".yellow(), diagnostic);
    }
}

/// Split a `--skills a,b` value into names.
pub fn parse_skill_list(raw: &str) -> Vec<String> {
    raw.split([',', '，'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
