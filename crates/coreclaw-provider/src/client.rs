// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the chat-completions provider contract.
//!
//! Handles request construction, bearer authentication, the per-request
//! deadline, and schema validation of the response.

use std::time::Duration;

use async_trait::async_trait;
use coreclaw_config::ProviderConfig;
use coreclaw_core::{ChatRequest, ChatResponse, CoreclawError, Provider};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::types::{self, WireRequest, WireResponse};

/// HTTP provider speaking the generic chat-completions JSON contract.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, CoreclawError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                CoreclawError::Config(format!("invalid provider API key header value: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| CoreclawError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn send(&self, request: &WireRequest) -> Result<ChatResponse, CoreclawError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .json(request)
            .send()
            .await
            .map_err(|e| CoreclawError::Provider {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, "provider response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreclawError::Provider {
                message: format!("provider returned {status}: {body}"),
                source: None,
            });
        }

        let body = response.text().await.map_err(|e| CoreclawError::Provider {
            message: format!("failed to read provider response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        let wire: WireResponse =
            serde_json::from_str(&body).map_err(|e| CoreclawError::Provider {
                message: format!("invalid provider response: {e}"),
                source: Some(Box::new(e)),
            })?;

        let choice = wire.choices.into_iter().next().ok_or_else(|| {
            CoreclawError::Provider {
                message: "provider response has no choices".to_string(),
                source: None,
            }
        })?;

        let content = choice.message.content.as_ref().map(|c| c.flatten());
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .iter()
            .map(types::decode_tool_call)
            .collect();

        Ok(ChatResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CoreclawError> {
        let wire = WireRequest {
            model: request.model,
            messages: types::to_wire_messages(&request.messages),
            tools: match &request.tools {
                Some(tools) if !tools.is_empty() => Some(types::to_wire_tools(tools)),
                _ => None,
            },
            temperature: request.temperature,
        };

        let deadline = Duration::from_millis(self.config.timeout_ms);
        tokio::time::timeout(deadline, self.send(&wire))
            .await
            .map_err(|_| CoreclawError::ProviderTimeout {
                ms: self.config.timeout_ms,
            })?
    }
}
