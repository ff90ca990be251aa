//! Prompt Builder System
//!
//! Standardized prompt construction for regression-risk analysis.
//!
//! ## Design Principles
//!
//! 1. **Role Definition**: Clear AI role for the task
//! 2. **Structured Objectives**: Numbered goals
//! 3. **Context Sections**: Organized input data, in a stable order
//! 4. **Focus Enforcement**: Keep the answer on the file under review
//!
//! Diffs are embedded in full. Only commit messages are capped.

use std::collections::BTreeMap;

use crate::constants::prompt::MAX_COMMIT_MESSAGE_CHARS;
use crate::types::{ChangeEntry, HistoricalChange};

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Ordered key-value pairs
    Context(Vec<(String, String)>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Fenced block with language tag
    Code { language: String, content: String },
    /// Focus enforcement with restrictions
    Focus {
        target: String,
        restrictions: Vec<String>,
    },
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Add a context item, appending to the last context section if any
    pub fn context_item(mut self, key: &str, value: &str) -> Self {
        if let Some(PromptSection::Context(items)) = self.sections.last_mut() {
            items.push((key.to_string(), value.to_string()));
        } else {
            self.sections.push(PromptSection::Context(vec![(
                key.to_string(),
                value.to_string(),
            )]));
        }
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    /// Add text section
    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    /// Add code block
    pub fn code(mut self, language: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Code {
            language: language.to_string(),
            content: content.to_string(),
        });
        self
    }

    /// Add focus enforcement section
    pub fn focus(mut self, target: &str, restrictions: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Focus {
            target: target.to_string(),
            restrictions: restrictions.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str("<ROLE>\n");
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n",
                        expertise, task
                    ));
                    prompt.push_str("</ROLE>\n\n");
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("<OBJECTIVES>\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push_str("</OBJECTIVES>\n\n");
                }
                PromptSection::Context(items) => {
                    prompt.push_str("# Context\n\n");
                    for (key, value) in items {
                        prompt.push_str(&format!("**{}**: {}\n", key, value));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("# {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Code { language, content } => {
                    prompt.push_str(&format!("```{}\n", language));
                    prompt.push_str(&content);
                    prompt.push_str("\n```\n\n");
                }
                PromptSection::Focus {
                    target,
                    restrictions,
                } => {
                    prompt.push_str("<FOCUS>\n");
                    prompt.push_str(&format!("IMPORTANT: Focus EXCLUSIVELY on: {}\n", target));
                    for restriction in restrictions {
                        prompt.push_str(&format!("- {}\n", restriction));
                    }
                    prompt.push_str("</FOCUS>\n\n");
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

/// Knobs for regression prompt assembly
#[derive(Debug, Clone)]
pub struct PromptOptions {
    pub max_commit_message_chars: usize,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_commit_message_chars: MAX_COMMIT_MESSAGE_CHARS,
        }
    }
}

/// Assemble the regression-risk prompt for one changed file.
///
/// `tickets` maps ticket ids to their resolved descriptions; ids with no
/// description are still listed on the commits that mention them.
pub fn regression_prompt(
    entry: &ChangeEntry,
    tickets: &BTreeMap<String, String>,
    options: &PromptOptions,
) -> String {
    let mut builder = PromptBuilder::new()
        .role(
            "software engineer",
            "regression-risk review of pull requests",
        )
        .objectives(vec![
            "Compare the new change with every earlier change to the same file",
            "Point out where the new change reverts, contradicts or re-breaks behavior an earlier commit fixed",
            "Use the linked tickets to explain why earlier changes were made",
            "Rate the regression risk as LOW, MEDIUM or HIGH and justify it",
            "List concrete scenarios worth testing before merging",
        ])
        .focus(
            entry.path(),
            vec![
                "Do NOT review code style or naming",
                "Do NOT speculate about files you cannot see",
                "ONLY report risks grounded in the diffs and tickets below",
            ],
        )
        .context_item("File", entry.path())
        .context_item("Earlier changes", &entry.past_changes().len().to_string());

    builder = match entry.current_changes() {
        Some(diff) => builder
            .section("Current Change", "The pull request modifies the file as follows:")
            .code("diff", diff),
        None => builder.section(
            "Current Change",
            "The file was renamed or moved without content changes.",
        ),
    };

    if entry.past_changes().is_empty() {
        builder = builder.section("Change History", "No earlier commits touch this file.");
    } else {
        builder = builder.section(
            "Change History",
            &format!(
                "{} earlier commits, in the order the history was returned.",
                entry.past_changes().len()
            ),
        );
        for (idx, change) in entry.past_changes().iter().enumerate() {
            builder = builder
                .text(&history_header(idx + 1, change, options))
                .code("diff", &change.diff);
        }
    }

    let referenced: Vec<(&String, &String)> = tickets
        .iter()
        .filter(|(id, _)| {
            entry
                .past_changes()
                .iter()
                .any(|c| c.ticket_ids.contains(*id))
        })
        .collect();
    if !referenced.is_empty() {
        let body = referenced
            .iter()
            .map(|(id, description)| format!("## {}\n\n{}", id, description.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");
        builder = builder.section("Linked Tickets", &body);
    }

    builder.build()
}

fn history_header(position: usize, change: &HistoricalChange, options: &PromptOptions) -> String {
    let tickets = if change.ticket_ids.is_empty() {
        "none".to_string()
    } else {
        change
            .ticket_ids
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "### Change {} (revision {})\n**Tickets**: {}\n**Message**: {}",
        position,
        change.revision(),
        tickets,
        cap_chars(change.commit_message.trim(), options.max_commit_message_chars)
    )
}

/// Cut `text` to `max` characters, marking the cut
fn cap_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
