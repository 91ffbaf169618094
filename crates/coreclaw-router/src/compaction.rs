// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation compaction: summarize the recent block and prune history.

use std::sync::Arc;

use coreclaw_core::{ChatMessage, ChatRequest, CoreclawError, Provider};
use coreclaw_storage::Storage;
use tracing::{debug, warn};

const SUMMARY_PROMPT: &str =
    "Summarize the conversation. Keep it under 150 words and keep concrete names, \
     decisions, and open items.";

/// Summarize the chat's recent messages into `ConversationState.summary`
/// and prune rows beyond the history cap.
pub async fn compact_chat(
    storage: &Arc<Storage>,
    provider: &Arc<dyn Provider>,
    model: &str,
    chat_fk: i64,
    history_max_messages: usize,
) -> Result<(), CoreclawError> {
    let history = storage
        .recent_messages(chat_fk, history_max_messages * 2)
        .await?;
    if history.is_empty() {
        return Ok(());
    }

    let mut messages: Vec<ChatMessage> = history
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
    messages.push(ChatMessage::User {
        content: SUMMARY_PROMPT.to_string(),
    });

    let response = provider
        .chat(ChatRequest {
            model: model.to_string(),
            messages,
            tools: None,
            temperature: None,
        })
        .await?;

    if let Some(summary) = response.content.filter(|s| !s.trim().is_empty()) {
        storage.set_summary(chat_fk, summary.trim()).await?;
    } else {
        warn!(chat = chat_fk, "compaction produced no summary");
    }

    let pruned = storage.prune_messages(chat_fk, history_max_messages).await?;
    debug!(chat = chat_fk, pruned, "compaction complete");
    Ok(())
}
