// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait, context, and registry.
//!
//! `execute` is the single gate every tool call passes through: argument
//! validation, the policy engine, the handler itself, the audit trail, and
//! output truncation. Tools never see the router; the [`ToolContext`]
//! exposes only storage and the bus publish methods.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use coreclaw_config::CoreclawConfig;
use coreclaw_core::{BusPublisher, CoreclawError, ToolDefinition};
use coreclaw_isolation::IsolatedToolRuntime;
use coreclaw_observability::Metrics;
use coreclaw_security::redact_json;
use coreclaw_storage::{ChatRecord, Storage, now_ms};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::policy;

/// Everything a tool may touch during one invocation.
#[derive(Clone)]
pub struct ToolContext {
    pub storage: Arc<Storage>,
    pub publisher: Arc<dyn BusPublisher>,
    pub config: Arc<CoreclawConfig>,
    /// The chat on whose behalf the tool runs.
    pub chat: ChatRecord,
    /// Present when the isolated runtime is enabled.
    pub isolation: Option<Arc<IsolatedToolRuntime>>,
}

/// A registered tool: typed parameters behind a JSON-schema face.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the parameters, surfaced to the model.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Cheap structural validation; the default parses into the tool's
    /// parameter struct and discards it.
    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError>;

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError>;
}

/// Parse tool arguments into a typed parameter struct.
pub fn parse_args<T: DeserializeOwned>(args: &serde_json::Value) -> Result<T, CoreclawError> {
    serde_json::from_value(args.clone())
        .map_err(|e| CoreclawError::BadArgs(e.to_string()))
}

/// Registry of available tools, indexed by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    metrics: Option<Arc<Metrics>>,
}

impl ToolRegistry {
    pub fn new(metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            tools: HashMap::new(),
            metrics,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool definitions for the provider request, sorted by name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Validate, authorize, run, audit, and truncate one tool call.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let started = Instant::now();
        let result = self.execute_inner(name, &args, ctx).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (outcome, reason) = match &result {
            Ok(_) => ("ok", None),
            Err(CoreclawError::PolicyDenied(message)) => ("denied", Some(message.clone())),
            Err(err) => ("error", Some(err.to_string())),
        };
        if let Some(metrics) = &self.metrics {
            metrics.record_tool_call(name, outcome == "ok", latency_ms);
        }

        let redacted = redact_json(&args).to_string();
        if let Err(err) = ctx
            .storage
            .insert_audit_event(
                "tool.execute",
                Some(name),
                outcome,
                reason.as_deref(),
                Some(&redacted),
                now_ms(),
            )
            .await
        {
            warn!(tool = name, error = %err, "failed to write audit event");
        }

        debug!(tool = name, outcome, latency_ms, "tool executed");
        result.map(|output| truncate_output(output, ctx.config.max_tool_output_chars))
    }

    async fn execute_inner(
        &self,
        name: &str,
        args: &serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| CoreclawError::BadArgs(format!("unknown tool {name:?}")))?;

        tool.validate(args)?;
        policy::check(name, &ctx.chat, args, &ctx.config)?;
        tool.invoke(args.clone(), ctx).await
    }
}

fn truncate_output(output: String, max_chars: usize) -> String {
    if output.chars().count() <= max_chars {
        return output;
    }
    let mut truncated: String = output.chars().take(max_chars).collect();
    truncated.push_str("\n...truncated");
    truncated
}
