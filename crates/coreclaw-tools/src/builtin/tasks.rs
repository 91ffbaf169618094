// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled-task management tools.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_scheduler::initial_next_run;
use coreclaw_storage::now_ms;
use serde::Deserialize;

use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskCreateParams {
    prompt: String,
    /// cron | interval | once
    schedule_type: String,
    /// Cron expression, or a millisecond count for interval/once.
    schedule_value: String,
    #[serde(default = "default_context_mode")]
    context_mode: String,
}

fn default_context_mode() -> String {
    "group".to_string()
}

pub struct TaskCreateTool;

#[async_trait]
impl Tool for TaskCreateTool {
    fn name(&self) -> &str {
        "task.create"
    }

    fn description(&self) -> &str {
        "Schedule a prompt to run later: cron, fixed interval, or once"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {"type": "string"},
                "schedule_type": {"type": "string", "enum": ["cron", "interval", "once"]},
                "schedule_value": {
                    "type": "string",
                    "description": "Cron expression, or delay/period in milliseconds"
                },
                "context_mode": {"type": "string", "enum": ["group", "isolated"], "default": "group"}
            },
            "required": ["prompt", "schedule_type", "schedule_value"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        let params: TaskCreateParams = parse_args(args)?;
        if params.context_mode != "group" && params.context_mode != "isolated" {
            return Err(CoreclawError::BadArgs(format!(
                "context_mode must be group or isolated, got {:?}",
                params.context_mode
            )));
        }
        // Schedule validation happens here too so bad schedules never land
        // in the table.
        initial_next_run(&params.schedule_type, &params.schedule_value, now_ms()).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: TaskCreateParams = parse_args(&args)?;
        let now = now_ms();
        let next_run_at = initial_next_run(&params.schedule_type, &params.schedule_value, now)?;
        let task_id = ctx
            .storage
            .create_task(
                ctx.chat.id,
                &params.prompt,
                &params.schedule_type,
                &params.schedule_value,
                &params.context_mode,
                Some(next_run_at),
                now,
            )
            .await?;
        Ok(serde_json::json!({"task_id": task_id, "next_run_at": next_run_at}).to_string())
    }
}

pub struct TaskListTool;

#[async_trait]
impl Tool for TaskListTool {
    fn name(&self) -> &str {
        "task.list"
    }

    fn description(&self) -> &str {
        "List this chat's scheduled tasks"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn validate(&self, _args: &serde_json::Value) -> Result<(), CoreclawError> {
        Ok(())
    }

    async fn invoke(
        &self,
        _args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let tasks = ctx.storage.tasks_for_chat(ctx.chat.id).await?;
        serde_json::to_string_pretty(&tasks).map_err(CoreclawError::storage)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskCancelParams {
    task_id: i64,
}

pub struct TaskCancelTool;

#[async_trait]
impl Tool for TaskCancelTool {
    fn name(&self) -> &str {
        "task.cancel"
    }

    fn description(&self) -> &str {
        "Cancel one of this chat's scheduled tasks"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "integer"}
            },
            "required": ["task_id"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<TaskCancelParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: TaskCancelParams = parse_args(&args)?;
        let task = ctx
            .storage
            .task(params.task_id)
            .await?
            .ok_or_else(|| CoreclawError::BadArgs(format!("no task {}", params.task_id)))?;
        if task.chat_fk != ctx.chat.id && !ctx.chat.is_admin() {
            return Err(CoreclawError::PolicyDenied(
                "cancelling another chat's task requires role admin".to_string(),
            ));
        }
        ctx.storage.set_task_status(params.task_id, "done").await?;
        Ok(format!("task {} cancelled", params.task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests_support::test_context;

    #[tokio::test]
    async fn create_list_cancel_cycle() {
        let (ctx, _dir) = test_context().await;

        let created = TaskCreateTool
            .invoke(
                serde_json::json!({
                    "prompt": "water the plants",
                    "schedule_type": "interval",
                    "schedule_value": "60000"
                }),
                &ctx,
            )
            .await
            .unwrap();
        let created: serde_json::Value = serde_json::from_str(&created).unwrap();
        let task_id = created["task_id"].as_i64().unwrap();

        let listed = TaskListTool
            .invoke(serde_json::json!({}), &ctx)
            .await
            .unwrap();
        assert!(listed.contains("water the plants"));

        TaskCancelTool
            .invoke(serde_json::json!({"task_id": task_id}), &ctx)
            .await
            .unwrap();
        let task = ctx.storage.task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, "done");
    }

    #[tokio::test]
    async fn bad_schedule_is_rejected_at_validation() {
        let err = TaskCreateTool
            .validate(&serde_json::json!({
                "prompt": "x",
                "schedule_type": "cron",
                "schedule_value": "not a cron"
            }))
            .unwrap_err();
        assert!(matches!(err, CoreclawError::BadArgs(_)));
    }

    #[tokio::test]
    async fn cancelling_foreign_task_requires_admin() {
        let (ctx, _dir) = test_context().await;
        let other = ctx.storage.get_or_create_chat("cli", "other").await.unwrap();
        let task_id = ctx
            .storage
            .create_task(other.id, "p", "once", "1000", "group", Some(1), 0)
            .await
            .unwrap();

        let err = TaskCancelTool
            .invoke(serde_json::json!({"task_id": task_id}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreclawError::PolicyDenied(_)));
    }
}
