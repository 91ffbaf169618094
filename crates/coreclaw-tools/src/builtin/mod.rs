// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builtin tool set.

pub mod chat;
pub mod dlq;
pub mod fs;
pub mod memory;
pub mod message;
pub mod shell;
pub mod skills;
pub mod tasks;
pub mod web;

use std::sync::Arc;

use coreclaw_core::CoreclawError;
use coreclaw_isolation::{WorkerRequest, execute};

use crate::registry::{ToolContext, ToolRegistry};

/// Register every builtin tool.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(fs::FsReadTool));
    registry.register(Arc::new(fs::FsWriteTool));
    registry.register(Arc::new(shell::ShellExecTool));
    registry.register(Arc::new(web::WebFetchTool));
    registry.register(Arc::new(memory::MemoryWriteTool));
    registry.register(Arc::new(message::MessageSendTool));
    registry.register(Arc::new(chat::ChatRegisterTool));
    registry.register(Arc::new(tasks::TaskCreateTool));
    registry.register(Arc::new(tasks::TaskListTool));
    registry.register(Arc::new(tasks::TaskCancelTool));
    registry.register(Arc::new(skills::SkillEnableTool));
    registry.register(Arc::new(skills::SkillDisableTool));
    registry.register(Arc::new(dlq::BusReplayTool));
}

/// Run a worker request in the isolated runtime when the tool is in the
/// configured subset, in-process otherwise.
pub(crate) async fn run_maybe_isolated(
    name: &str,
    request: WorkerRequest,
    ctx: &ToolContext,
) -> Result<String, CoreclawError> {
    if let Some(isolation) = &ctx.isolation
        && isolation.isolates(name)
    {
        return isolation.run(name, &request).await;
    }
    let response = execute(request).await;
    if response.ok {
        Ok(response.result.unwrap_or_default())
    } else {
        Err(CoreclawError::IsolatedWorker(
            response.error.unwrap_or_else(|| "unknown worker error".to_string()),
        ))
    }
}
