// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound HTTP fetch tool, behind the URL policy.

use async_trait::async_trait;
use coreclaw_core::CoreclawError;
use coreclaw_isolation::{WebFetchRequest, WorkerRequest};
use serde::Deserialize;

use crate::builtin::run_maybe_isolated;
use crate::registry::{Tool, ToolContext, parse_args};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WebFetchParams {
    url: String,
}

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web.fetch"
    }

    fn description(&self) -> &str {
        "Fetch a public HTTP(S) URL and return status, headers, and body"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "http or https URL"}
            },
            "required": ["url"]
        })
    }

    fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
        parse_args::<WebFetchParams>(args).map(|_| ())
    }

    async fn invoke(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, CoreclawError> {
        let params: WebFetchParams = parse_args(&args)?;
        let request = WorkerRequest::WebFetch(WebFetchRequest {
            url: params.url,
            allowed_domains: ctx.config.allowed_web_domains.clone(),
            allowed_ports: ctx.config.allowed_web_ports.clone(),
            blocked_ports: ctx.config.blocked_web_ports.clone(),
            max_response_chars: ctx.config.max_response_chars,
            timeout_ms: ctx.config.command_timeout_ms,
        });
        run_maybe_isolated(self.name(), request, ctx).await
    }
}
