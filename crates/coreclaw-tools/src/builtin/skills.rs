// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skill enable/disable tools, mutating the chat's conversation state.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use serde::Deserialize;

use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SkillParams {
    name: String,
}

pub struct SkillEnableTool;

#[async_trait]
impl Tool for SkillEnableTool {
    fn name(&self) -> &str {
        "skill.enable"
    }

    fn description(&self) -> &str {
        "Enable a skill for this chat"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<SkillParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: SkillParams = parse_args(&args)?;
        let mut skills = ctx
            .storage
            .conversation_state(ctx.chat.id)
            .await?
            .map(|s| s.enabled_skills)
            .unwrap_or_default();
        if !skills.contains(&params.name) {
            skills.push(params.name.clone());
            skills.sort();
            ctx.storage.set_enabled_skills(ctx.chat.id, &skills).await?;
        }
        Ok(format!("skill {} enabled", params.name))
    }
}

pub struct SkillDisableTool;

#[async_trait]
impl Tool for SkillDisableTool {
    fn name(&self) -> &str {
        "skill.disable"
    }

    fn description(&self) -> &str {
        "Disable a skill for this chat"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<SkillParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: SkillParams = parse_args(&args)?;
        let mut skills = ctx
            .storage
            .conversation_state(ctx.chat.id)
            .await?
            .map(|s| s.enabled_skills)
            .unwrap_or_default();
        skills.retain(|s| s != &params.name);
        ctx.storage.set_enabled_skills(ctx.chat.id, &skills).await?;
        Ok(format!("skill {} disabled", params.name))
    }
}
