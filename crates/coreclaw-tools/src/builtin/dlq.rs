// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dead-letter replay tool. Admin-only by policy; the CLI offers the same
//! operation for operators.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_storage::ReplaySelector;
use serde::Deserialize;

use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BusReplayParams {
    #[serde(default)]
    queue_id: Option<i64>,
    /// inbound | outbound; omitted means all.
    #[serde(default)]
    direction: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    50
}

pub struct BusReplayTool;

#[async_trait]
impl Tool for BusReplayTool {
    fn name(&self) -> &str {
        "bus.replay"
    }

    fn description(&self) -> &str {
        "Replay dead-lettered bus records back to pending"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "queue_id": {"type": "integer", "description": "Replay one record"},
                "direction": {"type": "string", "enum": ["inbound", "outbound"]},
                "limit": {"type": "integer", "default": 50}
            }
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        let params: BusReplayParams = parse_args(args)?;
        if let Some(direction) = &params.direction
            && direction != "inbound"
            && direction != "outbound"
        {
            return Err(CoreclawError::BadArgs(format!(
                "direction must be inbound or outbound, got {direction:?}"
            )));
        }
        Ok(())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: BusReplayParams = parse_args(&args)?;
        let selector = match (params.queue_id, params.direction) {
            (Some(id), _) => ReplaySelector::ById(id),
            (None, Some(direction)) => ReplaySelector::ByDirection(direction),
            (None, None) => ReplaySelector::All,
        };
        let replayed = ctx
            .storage
            .replay_dead_letter(selector, params.limit)
            .await?;
        Ok(serde_json::json!({"replayed": replayed}).to_string())
    }
}
