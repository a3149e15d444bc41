//! Interactive REPL and the shared turn printer.
//!
//! Uses `rustyline` for readline-style editing with persistent input
//! history. Conversation history lives in a [`HistoryStore`] so follow-up
//! questions keep their context across sessions.

use std::io::Write;

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::sync::mpsc;
use tracing::debug;

use skillbot_agent::{CancellationToken, ConversationLoop, TurnEvent, TurnOutcome};
use skillbot_core::types::Message;
use skillbot_core::HistoryStore;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "q", "bye", "/exit", "/quit", ":q"];

/// What a line of REPL input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Exit,
    Reload,
    Clear,
    ListSkills,
    Chat(&'a str),
}

fn parse_command(input: &str) -> Command<'_> {
    let lower = input.to_lowercase();
    if EXIT_COMMANDS.contains(&lower.as_str()) {
        return Command::Exit;
    }
    match lower.as_str() {
        "/reload" => Command::Reload,
        "/clear" => Command::Clear,
        "/skills" => Command::ListSkills,
        _ => Command::Chat(input),
    }
}

/// Run the interactive REPL loop.
pub async fn run(
    agent: &ConversationLoop,
    skills: &[String],
    mut history: HistoryStore,
    quiet: bool,
) -> Result<()> {
    helpers::print_banner();
    if !history.is_empty() {
        println!("{}", format!("(continuing with {} history entries)", history.len()).dimmed());
    }

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        match parse_command(trimmed) {
            Command::Exit => {
                println!("\nGoodbye! 👋");
                break;
            }
            Command::Reload => {
                let diff = agent.registry().reload().await;
                if diff.is_empty() {
                    println!("{}", "Skills unchanged.".dimmed());
                } else {
                    println!(
                        "{} added {:?}, removed {:?}, changed {:?}",
                        "Skills reloaded:".green(),
                        diff.added,
                        diff.removed,
                        diff.changed
                    );
                }
                for diagnostic in &diff.diagnostics {
                    eprintln!("{} {}", "⚠".yellow(), diagnostic);
                }
            }
            Command::Clear => {
                history.clear();
                println!("{}", "History cleared.".dimmed());
            }
            Command::ListSkills => helpers::print_catalog(&agent.registry().snapshot()),
            Command::Chat(text) => {
                debug!(input = text, "processing input");
                let outcome = chat(agent, text, skills, &history.messages(), quiet).await;
                if outcome.is_done() {
                    history.record_turn(text, &outcome.answer);
                }
            }
        }
    }

    save_input_history(&mut editor);
    Ok(())
}

/// Run one turn, streaming its progress to the terminal.
///
/// Ctrl-C during the turn cancels it after the current round.
pub async fn chat(
    agent: &ConversationLoop,
    text: &str,
    skills: &[String],
    history: &[Message],
    quiet: bool,
) -> TurnOutcome {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx, quiet));

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let outcome = agent.run_turn_with(text, skills, history, Some(&tx), &cancel).await;

    watcher.abort();
    drop(tx);
    let _ = printer.await;

    helpers::print_outcome(&outcome, quiet);
    outcome
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<TurnEvent>, quiet: bool) {
    let mut answering = false;
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::SkillsActivated(names) if !quiet => helpers::print_skills(&names),
            TurnEvent::TextDelta(delta) => {
                if !answering {
                    helpers::print_answer_header();
                    answering = true;
                }
                print!("{delta}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::ToolFinished {
                tool_name,
                success,
                elapsed,
                content,
                ..
            } if !quiet => {
                if answering {
                    println!();
                    answering = false;
                }
                helpers::print_tool_finished(&tool_name, success, elapsed);
                helpers::print_tool_preview(&content);
            }
            _ => {}
        }
    }
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let path = input_history_path();
    if path.exists() {
        let _ = editor.load_history(&path);
        debug!("loaded REPL history from {}", path.display());
    }

    Ok(editor)
}

fn save_input_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = input_history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn input_history_path() -> std::path::PathBuf {
    skillbot_core::utils::get_data_path().join("history").join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands() {
        for word in ["exit", "QUIT", "q", "Bye", "/exit", ":q"] {
            assert_eq!(parse_command(word), Command::Exit, "{word}");
        }
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_command("/reload"), Command::Reload);
        assert_eq!(parse_command("/CLEAR"), Command::Clear);
        assert_eq!(parse_command("/skills"), Command::ListSkills);
    }

    #[test]
    fn everything_else_is_chat() {
        assert_eq!(parse_command("写个提交说明"), Command::Chat("写个提交说明"));
        assert_eq!(parse_command("quit smoking tips"), Command::Chat("quit smoking tips"));
    }
}
