// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat registration tool. Normal registration just flips the persistence
//! flag; admin registration goes through the bootstrap protocol.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_storage::now_ms;
use serde::Deserialize;

use crate::bootstrap;
use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChatRegisterParams {
    #[serde(default = "default_role")]
    role: String,
    #[serde(default)]
    bootstrap_key: Option<String>,
}

fn default_role() -> String {
    "normal".to_string()
}

pub struct ChatRegisterTool;

#[async_trait]
impl Tool for ChatRegisterTool {
    fn name(&self) -> &str {
        "chat.register"
    }

    fn description(&self) -> &str {
        "Register this chat for full history persistence; role=admin uses the bootstrap key"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "role": {"type": "string", "enum": ["normal", "admin"], "default": "normal"},
                "bootstrap_key": {"type": "string", "description": "Required for role=admin"}
            }
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        let params: ChatRegisterParams = parse_args(args)?;
        if params.role != "normal" && params.role != "admin" {
            return Err(CoreclawError::BadArgs(format!(
                "role must be normal or admin, got {:?}",
                params.role
            )));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: ChatRegisterParams = parse_args(&args)?;

        if params.role == "admin" && !ctx.chat.is_admin() {
            let key = params.bootstrap_key.as_deref().unwrap_or("");
            bootstrap::register_admin(&ctx.storage, &ctx.config, &ctx.chat, key, now_ms()).await?;
        }

        ctx.storage.set_chat_registered(ctx.chat.id, true).await?;
        Ok(format!("chat registered with role {}", params.role))
    }
}
