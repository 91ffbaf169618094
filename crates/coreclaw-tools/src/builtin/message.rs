// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound send tool. Sending to another chat is admin-only by policy.

use async_trait::async_trait;
use coreclaw_core::{BusPublisher, CoreclawError, Envelope};
use coreclaw_storage::now_iso;
use serde::Deserialize;

use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MessageSendParams {
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    chat_id: Option<String>,
    content: String,
}

pub struct MessageSendTool;

#[async_trait]
impl Tool for MessageSendTool {
    fn name(&self) -> &str {
        "message.send"
    }

    fn description(&self) -> &str {
        "Send a message to this chat, or to another chat (admin)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel": {"type": "string", "description": "Defaults to the current channel"},
                "chat_id": {"type": "string", "description": "Defaults to the current chat"},
                "content": {"type": "string"}
            },
            "required": ["content"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<MessageSendParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: MessageSendParams = parse_args(&args)?;
        let channel = params.channel.unwrap_or_else(|| ctx.chat.channel.clone());
        let chat_id = params.chat_id.unwrap_or_else(|| ctx.chat.chat_id.clone());

        let envelope = Envelope {
            id: format!("send:{}", uuid::Uuid::new_v4()),
            channel: channel.clone(),
            chat_id: chat_id.clone(),
            sender_id: None,
            content: params.content,
            created_at: now_iso(),
            metadata: None,
        };
        ctx.publisher.publish_outbound(envelope).await?;
        Ok(format!("queued message for {channel}:{chat_id}"))
    }
}
