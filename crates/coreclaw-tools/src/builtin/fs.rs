// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workspace file tools.

use std::path::Path;

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_isolation::{FsWriteRequest, WorkerRequest};
use coreclaw_security::resolve_in_workspace;
use serde::Deserialize;

use crate::builtin::run_maybe_isolated;
use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FsReadParams {
    path: String,
}

/// Read a file inside the workspace.
pub struct FsReadTool;

#[async_trait]
impl Tool for FsReadTool {
    fn name(&self) -> &str {
        "fs.read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"}
            },
            "required": ["path"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<FsReadParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: FsReadParams = parse_args(&args)?;
        let resolved = resolve_in_workspace(Path::new(&ctx.config.workspace_dir), &params.path)?;
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| CoreclawError::Internal(format!("read {} failed: {e}", params.path)))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FsWriteParams {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

/// Write (or append to) a file inside the workspace. Runs isolated when
/// configured.
pub struct FsWriteTool;

#[async_trait]
impl Tool for FsWriteTool {
    fn name(&self) -> &str {
        "fs.write"
    }

    fn description(&self) -> &str {
        "Write or append a text file inside the workspace"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Workspace-relative path"},
                "content": {"type": "string"},
                "append": {"type": "boolean", "default": false}
            },
            "required": ["path", "content"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<FsWriteParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: FsWriteParams = parse_args(&args)?;
        let request = WorkerRequest::FsWrite(FsWriteRequest {
            workspace_dir: ctx.config.workspace_dir.clone(),
            path: params.path,
            content: params.content,
            append: params.append,
        });
        run_maybe_isolated(self.name(), request, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests_support::test_context;

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (ctx, _dir) = test_context().await;

        let written = FsWriteTool
            .invoke(
                serde_json::json!({"path": "notes/a.txt", "content": "hello"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(written.contains("notes/a.txt"));

        let read = FsReadTool
            .invoke(serde_json::json!({"path": "notes/a.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(read, "hello");
    }

    #[tokio::test]
    async fn append_extends_file() {
        let (ctx, _dir) = test_context().await;
        FsWriteTool
            .invoke(serde_json::json!({"path": "log.txt", "content": "a"}), &ctx)
            .await
            .unwrap();
        FsWriteTool
            .invoke(
                serde_json::json!({"path": "log.txt", "content": "b", "append": true}),
                &ctx,
            )
            .await
            .unwrap();
        let read = FsReadTool
            .invoke(serde_json::json!({"path": "log.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(read, "ab");
    }

    #[tokio::test]
    async fn escape_attempts_fail() {
        let (ctx, _dir) = test_context().await;
        let err = FsWriteTool
            .invoke(
                serde_json::json!({"path": "../outside.txt", "content": "x"}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside workspace"));

        let err = FsReadTool
            .invoke(serde_json::json!({"path": "/etc/passwd"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside workspace"));
    }

    #[tokio::test]
    async fn missing_read_is_an_error() {
        let (ctx, _dir) = test_context().await;
        let err = FsReadTool
            .invoke(serde_json::json!({"path": "nope.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed"));
    }
}
