//! Context builder — renders activated skills into the system instruction
//! and gathers the tool schemas the model may call.
//!
//! # Output shape
//!
//! ```text
//! <base instruction>
//!
//! ## Agent Skills
//!
//! Active skills: commit-message, clock. Apply each skill's instructions when relevant.
//!
//! ### commit-message
//! **Description**: Write Git commit messages
//!
//! <body>
//!
//! ---
//!
//! ### clock
//! ...
//! ```

use std::collections::HashSet;

use skillbot_core::config::schema::DEFAULT_SYSTEM_PROMPT;
use skillbot_core::types::{Message, ToolDefinition};
use tracing::debug;

use crate::registry::Catalog;

const SKILLS_HEADING: &str = "## Agent Skills";
const SECTION_DELIMITER: &str = "\n\n---\n\n";

/// System instruction plus the tools exposed for one turn.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedContext {
    pub system_instruction: String,
    pub tool_schemas: Vec<ToolDefinition>,
}

/// Builds the per-turn context from a catalog snapshot.
#[derive(Clone, Debug)]
pub struct ContextBuilder {
    base_instruction: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

impl ContextBuilder {
    pub fn new(base_instruction: impl Into<String>) -> Self {
        Self {
            base_instruction: base_instruction.into(),
        }
    }

    pub fn base_instruction(&self) -> &str {
        &self.base_instruction
    }

    /// Render the activated bundles (in catalog order) and their tools.
    ///
    /// Names not present in `catalog` are ignored.
    pub fn render(&self, catalog: &Catalog, activated: &[String]) -> RenderedContext {
        let active: HashSet<&str> = activated.iter().map(String::as_str).collect();
        let bundles: Vec<_> = catalog
            .bundles()
            .iter()
            .filter(|b| active.contains(b.name.as_str()))
            .collect();

        let mut system_instruction = self.base_instruction.trim_end().to_string();

        if !bundles.is_empty() {
            let names: Vec<&str> = bundles.iter().map(|b| b.name.as_str()).collect();
            let sections: Vec<String> = bundles
                .iter()
                .map(|b| {
                    let mut section = format!("### {}\n", b.name);
                    if !b.description.is_empty() {
                        section.push_str(&format!("**Description**: {}\n", b.description));
                    }
                    section.push('\n');
                    section.push_str(&b.body);
                    section
                })
                .collect();

            if !system_instruction.is_empty() {
                system_instruction.push_str("\n\n");
            }
            system_instruction.push_str(&format!(
                "{SKILLS_HEADING}\n\nActive skills: {}. Apply each skill's instructions when relevant.\n\n{}",
                names.join(", "),
                sections.join(SECTION_DELIMITER)
            ));
        }

        // Tools of active bundles only, first occurrence of a name wins
        let mut seen = HashSet::new();
        let tool_schemas: Vec<ToolDefinition> = bundles
            .iter()
            .flat_map(|b| catalog.tools_of(&b.name))
            .filter(|t| seen.insert(t.spec.tool_name.clone()))
            .map(|t| t.spec.schema.clone())
            .collect();

        debug!(
            skills = bundles.len(),
            tools = tool_schemas.len(),
            chars = system_instruction.len(),
            "context rendered"
        );

        RenderedContext {
            system_instruction,
            tool_schemas,
        }
    }

    /// Assemble the initial message list for a turn.
    ///
    /// Only user and assistant entries of `history` are kept.
    pub fn build_messages(
        &self,
        rendered: &RenderedContext,
        history: &[Message],
        user_text: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&rendered.system_instruction));
        messages.extend(
            history
                .iter()
                .filter(|m| matches!(m, Message::User { .. } | Message::Assistant { content: Some(_), tool_calls: None }))
                .cloned(),
        );
        messages.push(Message::user(user_text));
        messages
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
