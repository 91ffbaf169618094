// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Role-based tool policy.
//!
//! Denials name the role the caller would need; the registry audits them
//! and the model sees them as tool errors.

use coreclaw_config::CoreclawConfig;
use coreclaw_core::CoreclawError;
use coreclaw_storage::ChatRecord;

/// Files (and one directory) under the workspace that only admins may write.
const PROTECTED_WRITE_TARGETS: &[&str] = &["IDENTITY.md", "TOOLS.md", "USER.md", ".mcp.json"];

/// Check one tool call against the policy rules.
pub fn check(
    tool: &str,
    chat: &ChatRecord,
    args: &serde_json::Value,
    config: &CoreclawConfig,
) -> Result<(), CoreclawError> {
    match tool {
        "shell.exec" => require_admin(chat, "shell.exec"),
        "bus.replay" => require_admin(chat, "bus.replay"),
        "fs.write" => {
            let path = args.get("path").and_then(|v| v.as_str()).unwrap_or("");
            if is_protected_write(path) {
                require_admin(chat, &format!("fs.write to {path}"))
            } else {
                Ok(())
            }
        }
        "memory.write" => {
            let scope = args.get("scope").and_then(|v| v.as_str()).unwrap_or("chat");
            if scope == "global" {
                require_admin(chat, "memory.write with scope=global")
            } else {
                Ok(())
            }
        }
        "message.send" => {
            let target_channel = args
                .get("channel")
                .and_then(|v| v.as_str())
                .unwrap_or(&chat.channel);
            let target_chat = args
                .get("chat_id")
                .and_then(|v| v.as_str())
                .unwrap_or(&chat.chat_id);
            if target_channel != chat.channel || target_chat != chat.chat_id {
                require_admin(chat, "message.send to another chat")
            } else {
                Ok(())
            }
        }
        name if name.starts_with("mcp.") => {
            require_admin(chat, "MCP tools")?;
            let rest = name.trim_start_matches("mcp.");
            let (server, tool_name) = rest.split_once('.').unwrap_or((rest, ""));
            check_mcp(server, tool_name, &config.mcp_allowlist)
        }
        _ => Ok(()),
    }
}

fn require_admin(chat: &ChatRecord, what: &str) -> Result<(), CoreclawError> {
    if chat.is_admin() {
        Ok(())
    } else {
        Err(CoreclawError::PolicyDenied(format!(
            "{what} requires role admin"
        )))
    }
}

/// Writes to identity/profile files, the MCP config, and anything under
/// `skills/` are admin-only.
fn is_protected_write(path: &str) -> bool {
    let normalized = path.trim_start_matches("./");
    PROTECTED_WRITE_TARGETS.contains(&normalized)
        || normalized == "skills"
        || normalized.starts_with("skills/")
}

/// Check a server/tool pair against the MCP allowlist. Accepted entries are
/// the exact `server.tool` name, the `server/tool` alias, or a bare server
/// name that admits all of its tools.
pub fn check_mcp(server: &str, tool: &str, allowlist: &[String]) -> Result<(), CoreclawError> {
    let dotted = format!("{server}.{tool}");
    let slashed = format!("{server}/{tool}");
    let allowed = allowlist
        .iter()
        .any(|entry| entry == &dotted || entry == &slashed || entry == server);
    if allowed {
        Ok(())
    } else {
        Err(CoreclawError::PolicyDenied(format!(
            "MCP tool {dotted} is not in the allowlist"
        )))
    }
}
