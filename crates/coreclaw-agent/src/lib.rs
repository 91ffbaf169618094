// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent runtime: the bounded tool-calling loop.
//!
//! Each iteration sends the conversation (plus the registry's current tool
//! definitions) to the provider. Tool calls are executed in order through
//! the registry; tool errors are fed back to the model as tool results so
//! it can recover. The loop ends on a plain content reply, or with a
//! sentinel once the iteration cap is hit.

use std::sync::Arc;

use coreclaw_core::{ChatMessage, ChatRequest, CoreclawError, Provider};
use coreclaw_tools::{ToolContext, ToolRegistry};
use tracing::{debug, warn};

/// Reply produced when the loop exhausts its iterations.
pub const TOOL_LIMIT_SENTINEL: &str = "Unable to complete the request within tool limits.";

/// Result of one agent run.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Final assistant content.
    pub content: String,
    /// Assistant tool-call and tool-result messages produced along the way.
    pub tool_messages: Vec<ChatMessage>,
}

/// Drives the model/tool loop for one inbound turn.
pub struct AgentRuntime {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: Option<f64>,
    max_tool_iterations: usize,
}

impl AgentRuntime {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: String,
        temperature: Option<f64>,
        max_tool_iterations: usize,
    ) -> Self {
        Self {
            provider,
            model,
            temperature,
            max_tool_iterations,
        }
    }

    pub async fn run(
        &self,
        registry: &ToolRegistry,
        ctx: &ToolContext,
        mut messages: Vec<ChatMessage>,
    ) -> Result<AgentOutcome, CoreclawError> {
        let mut tool_messages = Vec::new();

        for iteration in 0..self.max_tool_iterations {
            let definitions = registry.tool_definitions();
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: if definitions.is_empty() {
                    None
                } else {
                    Some(definitions)
                },
                temperature: self.temperature,
            };

            let response = self.provider.chat(request).await?;

            if !response.tool_calls.is_empty() {
                debug!(
                    iteration,
                    calls = response.tool_calls.len(),
                    "model requested tool calls"
                );
                let assistant = ChatMessage::Assistant {
                    content: String::new(),
                    tool_calls: response.tool_calls.clone(),
                };
                messages.push(assistant.clone());
                tool_messages.push(assistant);

                for call in &response.tool_calls {
                    let result = registry
                        .execute(&call.name, call.arguments.clone(), ctx)
                        .await;
                    let content = match result {
                        Ok(output) => output,
                        Err(err) => {
                            warn!(tool = %call.name, error = %err, "tool call failed");
                            format!("Tool error: {err}")
                        }
                    };
                    let tool_message = ChatMessage::Tool {
                        call_id: call.id.clone(),
                        content,
                    };
                    messages.push(tool_message.clone());
                    tool_messages.push(tool_message);
                }
                continue;
            }

            if let Some(content) = response.content {
                return Ok(AgentOutcome {
                    content,
                    tool_messages,
                });
            }

            // Neither content nor tool calls: nothing more to do.
            return Ok(AgentOutcome {
                content: String::new(),
                tool_messages,
            });
        }

        warn!(limit = self.max_tool_iterations, "tool iteration limit reached");
        Ok(AgentOutcome {
            content: TOOL_LIMIT_SENTINEL.to_string(),
            tool_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use coreclaw_core::{BusPublisher, ChatResponse, Envelope, ToolCall};
    use coreclaw_tools::{Tool, parse_args};
    use std::sync::Mutex;

    /// Provider that replays a scripted sequence of responses and records
    /// every request it saw.
    struct ScriptedProvider {
        responses: Mutex<Vec<ChatResponse>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CoreclawError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(ChatResponse {
                    content: Some("default".to_string()),
                    tool_calls: vec![],
                })
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl BusPublisher for NullPublisher {
        async fn publish_inbound(&self, _e: Envelope) -> Result<Option<i64>, CoreclawError> {
            Ok(None)
        }
        async fn publish_outbound(&self, _e: Envelope) -> Result<Option<i64>, CoreclawError> {
            Ok(None)
        }
    }

    #[derive(serde::Deserialize)]
    struct UpperParams {
        text: String,
    }

    struct UpperTool;

    #[async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "text.upper"
        }
        fn description(&self) -> &str {
            "Uppercase a string"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }
        fn validate(&self, args: &serde_json::Value) -> Result<(), CoreclawError> {
            parse_args::<UpperParams>(args).map(|_| ())
        }
        async fn invoke(
            &self,
            args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<String, CoreclawError> {
            let params: UpperParams = parse_args(&args)?;
            Ok(params.text.to_uppercase())
        }
    }

    async fn test_ctx(dir: &std::path::Path) -> ToolContext {
        let storage = Arc::new(coreclaw_storage::open_in_dir(dir).await.unwrap());
        let chat = storage.get_or_create_chat("cli", "tester").await.unwrap();
        ToolContext {
            storage,
            publisher: Arc::new(NullPublisher),
            config: Arc::new(coreclaw_config::CoreclawConfig::default()),
            chat,
            isolation: None,
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(None);
        registry.register(Arc::new(UpperTool));
        registry
    }

    fn user(content: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::User {
            content: content.to_string(),
        }]
    }

    #[tokio::test]
    async fn plain_reply_ends_the_loop() {
        let provider = ScriptedProvider::new(vec![ChatResponse {
            content: Some("hello!".to_string()),
            tool_calls: vec![],
        }]);
        let runtime = AgentRuntime::new(provider.clone(), "m".to_string(), None, 5);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let outcome = runtime.run(&registry(), &ctx, user("hi")).await.unwrap();
        assert_eq!(outcome.content, "hello!");
        assert!(outcome.tool_messages.is_empty());
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tool_call_then_reply() {
        let provider = ScriptedProvider::new(vec![
            ChatResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "c1".to_string(),
                    name: "text.upper".to_string(),
                    arguments: serde_json::json!({"text": "abc"}),
                }],
            },
            ChatResponse {
                content: Some("done: ABC".to_string()),
                tool_calls: vec![],
            },
        ]);
        let runtime = AgentRuntime::new(provider.clone(), "m".to_string(), None, 5);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let outcome = runtime.run(&registry(), &ctx, user("upper abc")).await.unwrap();
        assert_eq!(outcome.content, "done: ABC");
        assert_eq!(outcome.tool_messages.len(), 2);

        // The second request carried the tool result back to the model.
        let requests = provider.requests.lock().unwrap();
        let second = &requests[1];
        let tool_result = second
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { content, call_id } if call_id == "c1" => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(tool_result, "ABC");
    }

    #[tokio::test]
    async fn tool_error_feeds_back_and_loop_continues() {
        let provider = ScriptedProvider::new(vec![
            ChatResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "c1".to_string(),
                    name: "text.upper".to_string(),
                    arguments: serde_json::json!({"wrong": true}),
                }],
            },
            ChatResponse {
                content: Some("recovered".to_string()),
                tool_calls: vec![],
            },
        ]);
        let runtime = AgentRuntime::new(provider.clone(), "m".to_string(), None, 5);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let outcome = runtime.run(&registry(), &ctx, user("x")).await.unwrap();
        assert_eq!(outcome.content, "recovered");

        let requests = provider.requests.lock().unwrap();
        let tool_result = requests[1]
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap();
        assert!(tool_result.starts_with("Tool error: "));
    }

    #[tokio::test]
    async fn iteration_cap_returns_sentinel() {
        // The model keeps asking for tools forever.
        let endless: Vec<ChatResponse> = (0..10)
            .map(|i| ChatResponse {
                content: None,
                tool_calls: vec![ToolCall {
                    id: format!("c{i}"),
                    name: "text.upper".to_string(),
                    arguments: serde_json::json!({"text": "x"}),
                }],
            })
            .collect();
        let provider = ScriptedProvider::new(endless);
        let runtime = AgentRuntime::new(provider.clone(), "m".to_string(), None, 3);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let outcome = runtime.run(&registry(), &ctx, user("x")).await.unwrap();
        assert_eq!(outcome.content, TOOL_LIMIT_SENTINEL);
        assert_eq!(provider.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tools_field_omitted_with_empty_registry() {
        let provider = ScriptedProvider::new(vec![ChatResponse {
            content: Some("ok".to_string()),
            tool_calls: vec![],
        }]);
        let runtime = AgentRuntime::new(provider.clone(), "m".to_string(), None, 5);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let empty = ToolRegistry::new(None);
        runtime.run(&empty, &ctx, user("x")).await.unwrap();
        assert!(provider.requests.lock().unwrap()[0].tools.is_none());
    }

    #[tokio::test]
    async fn provider_error_propagates() {
        struct FailingProvider;
        #[async_trait]
        impl Provider for FailingProvider {
            async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, CoreclawError> {
                Err(CoreclawError::ProviderTimeout { ms: 30_000 })
            }
        }
        let runtime = AgentRuntime::new(Arc::new(FailingProvider), "m".to_string(), None, 5);
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path()).await;

        let err = runtime.run(&registry(), &ctx, user("x")).await.unwrap_err();
        assert!(matches!(err, CoreclawError::ProviderTimeout { .. }));
    }
}
