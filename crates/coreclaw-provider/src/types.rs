// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the chat-completions HTTP contract.
//!
//! The response is schema-validated by serde; content arrives either as a
//! plain string or as an array of `{text}` fragments, and each tool call's
//! `arguments` is a JSON-encoded string (malformed arguments decode to an
//! empty object).

use coreclaw_core::{ChatMessage, ToolCall, ToolDefinition};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct WireRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireToolFunction,
}

#[derive(Debug, Serialize)]
pub struct WireToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: WireCallFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireCallFunction {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
pub struct WireResponse {
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub struct WireChoice {
    pub message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct WireResponseMessage {
    #[serde(default)]
    pub content: Option<WireContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

/// Response content: a plain string or an array of text fragments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WireContentPart>),
}

#[derive(Debug, Deserialize)]
pub struct WireContentPart {
    #[serde(default)]
    pub text: String,
}

impl WireContent {
    /// Flatten to a single string.
    pub fn flatten(&self) -> String {
        match self {
            WireContent::Text(text) => text.clone(),
            WireContent::Parts(parts) => {
                parts.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("")
            }
        }
    }
}

/// Convert conversation messages to the wire shape.
pub fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| match message {
            ChatMessage::System { content } => WireMessage {
                role: "system".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::User { content } => WireMessage {
                role: "user".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            ChatMessage::Assistant { content, tool_calls } => WireMessage {
                role: "assistant".to_string(),
                content: Some(content.clone()),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|call| WireToolCall {
                                id: call.id.clone(),
                                kind: "function".to_string(),
                                function: WireCallFunction {
                                    name: call.name.clone(),
                                    arguments: call.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: None,
            },
            ChatMessage::Tool { call_id, content } => WireMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(call_id.clone()),
            },
        })
        .collect()
}

/// Convert registry tool definitions to the wire shape.
pub fn to_wire_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|tool| WireTool {
            kind: "function".to_string(),
            function: WireToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

/// Decode a wire tool call, tolerating malformed argument strings.
pub fn decode_tool_call(call: &WireToolCall) -> ToolCall {
    let arguments = serde_json::from_str(&call.function.arguments)
        .unwrap_or_else(|_| serde_json::json!({}));
    ToolCall {
        id: call.id.clone(),
        name: call.function.name.clone(),
        arguments,
    }
}
