// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Coreclaw runtime.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Queue direction on the message bus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Role assigned to a chat. Admin chats may use privileged tools.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Admin,
    #[default]
    Normal,
}

/// Role of a persisted conversation message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// The durable payload carried on the bus, keyed by `id`.
///
/// Publishing the same `id` twice in the same direction is a no-op; the
/// dedupe table guarantees effectively-once enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Caller-supplied or generated unique message id.
    pub id: String,
    /// Channel name (cli, webhook, ...).
    pub channel: String,
    /// Channel-scoped chat identifier.
    pub chat_id: String,
    /// Optional sender identity within the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Message text.
    pub content: String,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// Optional free-form metadata (heartbeat/scheduled-task markers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Envelope {
    /// True when this envelope was synthesized by the heartbeat source.
    pub fn is_heartbeat(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("isHeartbeat"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// True when this envelope was synthesized by the scheduler.
    pub fn is_scheduled_task(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("isScheduledTask"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// What kind of turn an inbound envelope drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RunKind {
    Chat,
    Heartbeat,
    Scheduled,
}

/// Whether the turn sees the chat's shared context or runs isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ContextMode {
    Group,
    Isolated,
}

/// Derived execution mode governing prompt assembly and suppression policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMode {
    pub kind: RunKind,
    pub context_mode: ContextMode,
}

impl RunMode {
    /// Derive the run mode from an inbound envelope's metadata.
    pub fn derive(envelope: &Envelope) -> Self {
        if envelope.is_heartbeat() {
            return RunMode {
                kind: RunKind::Heartbeat,
                context_mode: ContextMode::Group,
            };
        }
        if envelope.is_scheduled_task() {
            let isolated = envelope
                .metadata
                .as_ref()
                .and_then(|m| m.get("contextMode"))
                .and_then(|v| v.as_str())
                .is_some_and(|mode| mode == "isolated");
            return RunMode {
                kind: RunKind::Scheduled,
                context_mode: if isolated {
                    ContextMode::Isolated
                } else {
                    ContextMode::Group
                },
            };
        }
        RunMode {
            kind: RunKind::Chat,
            context_mode: ContextMode::Group,
        }
    }

    /// Chat context (memory files, history, summary) is included for plain
    /// chat turns and for any group-context synthetic turn.
    pub fn includes_chat_context(&self) -> bool {
        self.kind == RunKind::Chat || self.context_mode == ContextMode::Group
    }
}

/// A single tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back in the tool result.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Parsed arguments. Malformed argument strings decode to an empty object.
    pub arguments: serde_json::Value,
}

/// One entry in the conversation sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        call_id: String,
        content: String,
    },
}

impl ChatMessage {
    /// The textual content of this message, regardless of variant.
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System { content }
            | ChatMessage::User { content }
            | ChatMessage::Assistant { content, .. }
            | ChatMessage::Tool { content, .. } => content,
        }
    }

    /// Replace the textual content, preserving the variant.
    pub fn with_content(&self, new_content: String) -> ChatMessage {
        match self {
            ChatMessage::System { .. } => ChatMessage::System {
                content: new_content,
            },
            ChatMessage::User { .. } => ChatMessage::User {
                content: new_content,
            },
            ChatMessage::Assistant { tool_calls, .. } => ChatMessage::Assistant {
                content: new_content,
                tool_calls: tool_calls.clone(),
            },
            ChatMessage::Tool { call_id, .. } => ChatMessage::Tool {
                call_id: call_id.clone(),
                content: new_content,
            },
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, ChatMessage::System { .. })
    }
}

/// Tool definition surfaced to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// Request to the chat provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Omitted from the wire request when `None` or empty.
    pub tools: Option<Vec<ToolDefinition>>,
    pub temperature: Option<f64>,
}

/// Response from the chat provider.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope_with_metadata(metadata: serde_json::Value) -> Envelope {
        Envelope {
            id: "m1".to_string(),
            channel: "cli".to_string(),
            chat_id: "c1".to_string(),
            sender_id: None,
            content: "hi".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: Some(metadata),
        }
    }

    #[test]
    fn run_mode_plain_chat() {
        let env = Envelope {
            metadata: None,
            ..envelope_with_metadata(serde_json::json!({}))
        };
        let mode = RunMode::derive(&env);
        assert_eq!(mode.kind, RunKind::Chat);
        assert_eq!(mode.context_mode, ContextMode::Group);
        assert!(mode.includes_chat_context());
    }

    #[test]
    fn run_mode_heartbeat() {
        let env = envelope_with_metadata(serde_json::json!({"isHeartbeat": true}));
        let mode = RunMode::derive(&env);
        assert_eq!(mode.kind, RunKind::Heartbeat);
        assert_eq!(mode.context_mode, ContextMode::Group);
    }

    #[test]
    fn run_mode_scheduled_isolated() {
        let env = envelope_with_metadata(serde_json::json!({
            "isScheduledTask": true,
            "contextMode": "isolated",
        }));
        let mode = RunMode::derive(&env);
        assert_eq!(mode.kind, RunKind::Scheduled);
        assert_eq!(mode.context_mode, ContextMode::Isolated);
        assert!(!mode.includes_chat_context());
    }

    #[test]
    fn run_mode_scheduled_group_includes_context() {
        let env = envelope_with_metadata(serde_json::json!({
            "isScheduledTask": true,
            "contextMode": "group",
        }));
        let mode = RunMode::derive(&env);
        assert_eq!(mode.kind, RunKind::Scheduled);
        assert!(mode.includes_chat_context());
    }

    #[test]
    fn direction_round_trips_through_strings() {
        assert_eq!(Direction::Inbound.to_string(), "inbound");
        assert_eq!("outbound".parse::<Direction>().unwrap(), Direction::Outbound);
    }

    #[test]
    fn envelope_serde_skips_empty_optionals() {
        let env = Envelope {
            id: "x".to_string(),
            channel: "cli".to_string(),
            chat_id: "c".to_string(),
            sender_id: None,
            content: "hello".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: None,
        };
        let json = serde_json::to_string(&env).unwrap();
        assert!(!json.contains("sender_id"));
        assert!(!json.contains("metadata"));
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "x");
    }

    #[test]
    fn chat_message_content_replacement_preserves_variant() {
        let msg = ChatMessage::Tool {
            call_id: "t1".to_string(),
            content: "old".to_string(),
        };
        let replaced = msg.with_content("new".to_string());
        match replaced {
            ChatMessage::Tool { call_id, content } => {
                assert_eq!(call_id, "t1");
                assert_eq!(content, "new");
            }
            _ => panic!("variant changed"),
        }
    }
}
