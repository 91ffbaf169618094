// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell execution tool. Admin-only by policy; the command is tokenized
//! and spawned without a shell interpreter.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_isolation::{ShellExecRequest, WorkerRequest};
use serde::Deserialize;

use crate::builtin::run_maybe_isolated;
use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ShellExecParams {
    command: String,
}

pub struct ShellExecTool;

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell.exec"
    }

    fn description(&self) -> &str {
        "Execute a command in the workspace and return its output"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Command line to run"}
            },
            "required": ["command"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<ShellExecParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: ShellExecParams = parse_args(&args)?;
        let request = WorkerRequest::ShellExec(ShellExecRequest {
            command: params.command,
            allow_shell: ctx.config.allow_shell,
            allowed_commands: ctx.config.allowed_shell_commands.clone(),
            workdir: ctx.config.workspace_dir.clone(),
            timeout_ms: ctx.config.command_timeout_ms,
            max_output_chars: ctx.config.isolation.max_worker_output_chars,
        });
        run_maybe_isolated(self.name(), request, ctx).await
    }
}
