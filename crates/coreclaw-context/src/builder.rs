// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles the model input for one inbound turn.
//!
//! The system prompt is built from workspace files and skill bodies in a
//! fixed order; chat history and the conversation summary join only when
//! the run mode includes chat context. The result is trimmed to the token
//! budget before it leaves this module.

use std::path::{Path, PathBuf};

use coreclaw_core::{ChatMessage, CoreclawError, Envelope, RunKind, RunMode};
use coreclaw_security::chat_memory_rel_path;
use coreclaw_storage::{ChatRecord, Storage};
use tracing::debug;

use crate::tokens;

/// Prefix applied to the user message of scheduled-task turns.
const SCHEDULED_PREFIX: &str = "[Scheduled Task] ";

/// A skill loaded from `skills/<name>/SKILL.md`.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub always: bool,
    pub body: String,
}

/// Builds the message list for the provider call.
pub struct ContextBuilder {
    workspace_dir: PathBuf,
    history_max_messages: usize,
    max_input_tokens: u32,
    reserve_output_tokens: u32,
}

impl ContextBuilder {
    pub fn new(
        workspace_dir: PathBuf,
        history_max_messages: usize,
        max_input_tokens: u32,
        reserve_output_tokens: u32,
    ) -> Self {
        Self {
            workspace_dir,
            history_max_messages,
            max_input_tokens,
            reserve_output_tokens,
        }
    }

    /// Assemble the full conversation for one inbound turn, trimmed to the
    /// token budget.
    pub async fn build(
        &self,
        storage: &Storage,
        chat: &ChatRecord,
        envelope: &Envelope,
        mode: RunMode,
    ) -> Result<Vec<ChatMessage>, CoreclawError> {
        let include_chat_context = mode.includes_chat_context();
        let mut messages = Vec::new();

        let system = self.system_prompt(storage, chat, include_chat_context).await?;
        if !system.is_empty() {
            messages.push(ChatMessage::System { content: system });
        }

        let user_content = match mode.kind {
            RunKind::Scheduled => format!("{SCHEDULED_PREFIX}{}", envelope.content),
            _ => envelope.content.clone(),
        };

        if include_chat_context {
            let mut history = storage
                .recent_messages(chat.id, self.history_max_messages + 1)
                .await?;
            // The inbound message may already be persisted; do not repeat it.
            if history
                .last()
                .is_some_and(|m| m.role == "user" && m.content == envelope.content)
            {
                history.pop();
            }
            let mut kept: Vec<ChatMessage> = history
                .into_iter()
                .filter(|m| !m.content.is_empty())
                .filter_map(|m| match m.role.as_str() {
                    "user" => Some(ChatMessage::User { content: m.content }),
                    "assistant" => Some(ChatMessage::Assistant {
                        content: m.content,
                        tool_calls: vec![],
                    }),
                    _ => None,
                })
                .collect();
            if kept.len() > self.history_max_messages {
                let excess = kept.len() - self.history_max_messages;
                kept.drain(..excess);
            }
            messages.extend(kept);
        }

        messages.push(ChatMessage::User {
            content: user_content,
        });

        let budget = tokens::input_budget(self.max_input_tokens, self.reserve_output_tokens);
        let before = tokens::conversation_tokens(&messages);
        let fitted = tokens::fit_to_budget(messages, budget);
        if tokens::conversation_tokens(&fitted) < before {
            debug!(chat = chat.id, before, budget, "conversation trimmed to budget");
        }
        Ok(fitted)
    }

    /// System prompt sections in order, joined by blank lines, empty
    /// sections omitted.
    async fn system_prompt(
        &self,
        storage: &Storage,
        chat: &ChatRecord,
        include_chat_context: bool,
    ) -> Result<String, CoreclawError> {
        let mut sections: Vec<String> = Vec::new();

        for file in ["IDENTITY.md", "TOOLS.md", "USER.md"] {
            if let Some(text) = read_optional(&self.workspace_dir.join(file)).await {
                sections.push(text);
            }
        }
        if let Some(text) = read_optional(&self.workspace_dir.join("memory/global.md")).await {
            sections.push(text);
        }
        if include_chat_context {
            let rel = chat_memory_rel_path(&self.workspace_dir, &chat.channel, &chat.chat_id);
            if let Some(text) = read_optional(&self.workspace_dir.join(rel)).await {
                sections.push(text);
            }
        }

        let skills = self.load_skills().await;
        if !skills.is_empty() {
            let index = skills
                .iter()
                .map(|s| {
                    if s.always {
                        format!("- {} [always]: {}", s.name, s.description)
                    } else {
                        format!("- {}: {}", s.name, s.description)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("Skills:\n{index}"));
        }

        for skill in skills.iter().filter(|s| s.always) {
            if !skill.body.is_empty() {
                sections.push(skill.body.clone());
            }
        }

        let enabled = if include_chat_context {
            storage
                .conversation_state(chat.id)
                .await?
                .map(|s| s.enabled_skills)
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        for skill in skills.iter().filter(|s| !s.always && enabled.contains(&s.name)) {
            if !skill.body.is_empty() {
                sections.push(skill.body.clone());
            }
        }

        if include_chat_context
            && let Some(state) = storage.conversation_state(chat.id).await?
            && !state.summary.is_empty()
        {
            sections.push(format!("Conversation summary:\n{}", state.summary));
        }

        Ok(sections.join("\n\n"))
    }

    /// Load every `skills/<name>/SKILL.md` under the workspace.
    pub async fn load_skills(&self) -> Vec<Skill> {
        let skills_dir = self.workspace_dir.join("skills");
        let mut skills = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&skills_dir).await else {
            return skills;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(text) = read_optional(&path.join("SKILL.md")).await {
                skills.push(parse_skill(&name, &text));
            }
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        skills
    }
}

/// Parse a skill file: optional `description:` / `always:` header lines up
/// to the first blank line, then the body.
fn parse_skill(name: &str, text: &str) -> Skill {
    let mut description = String::new();
    let mut always = false;
    let mut body_start = 0;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            body_start = index + 1;
            break;
        }
        if let Some(value) = trimmed.strip_prefix("description:") {
            description = value.trim().to_string();
        } else if let Some(value) = trimmed.strip_prefix("always:") {
            always = value.trim() == "true";
        } else {
            // No header block; the whole file is the body.
            body_start = index;
            break;
        }
        body_start = index + 1;
    }

    let body = text
        .lines()
        .skip(body_start)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    Skill {
        name: name.to_string(),
        description,
        always,
        body,
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            let trimmed = text.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        }
        Err(_) => None,
    }
}
