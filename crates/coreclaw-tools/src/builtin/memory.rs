// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory-file tool. Chat-scope writes land in the chat's memory file;
//! global scope (admin-only by policy) writes the shared memory file.

use std::path::Path;

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_security::{chat_memory_rel_path, resolve_in_workspace};
use serde::Deserialize;

use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MemoryWriteParams {
    #[serde(default = "default_scope")]
    scope: String,
    content: String,
    #[serde(default = "default_append")]
    append: bool,
}

fn default_scope() -> String {
    "chat".to_string()
}

fn default_append() -> bool {
    true
}

pub struct MemoryWriteTool;

#[async_trait]
impl Tool for MemoryWriteTool {
    fn name(&self) -> &str {
        "memory.write"
    }

    fn description(&self) -> &str {
        "Store a note in chat memory, or global memory with scope=global"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "scope": {"type": "string", "enum": ["chat", "global"], "default": "chat"},
                "content": {"type": "string"},
                "append": {"type": "boolean", "default": true}
            },
            "required": ["content"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        let params: MemoryWriteParams = parse_args(args)?;
        if params.scope != "chat" && params.scope != "global" {
            return Err(CoreclawError::BadArgs(format!(
                "scope must be chat or global, got {:?}",
                params.scope
            )));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: MemoryWriteParams = parse_args(&args)?;
        let workspace = Path::new(&ctx.config.workspace_dir);
        let rel = if params.scope == "global" {
            Path::new("memory/global.md").to_path_buf()
        } else {
            chat_memory_rel_path(workspace, &ctx.chat.channel, &ctx.chat.chat_id)
        };
        let resolved = resolve_in_workspace(workspace, &rel.display().to_string())?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreclawError::Internal(format!("mkdir failed: {e}")))?;
        }

        let mut text = params.content;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        if params.append {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .await
                .map_err(|e| CoreclawError::Internal(format!("open failed: {e}")))?;
            file.write_all(text.as_bytes())
                .await
                .map_err(|e| CoreclawError::Internal(format!("write failed: {e}")))?;
        } else {
            tokio::fs::write(&resolved, text.as_bytes())
                .await
                .map_err(|e| CoreclawError::Internal(format!("write failed: {e}")))?;
        }
        Ok(format!("remembered in {} memory", params.scope))
    }
}
