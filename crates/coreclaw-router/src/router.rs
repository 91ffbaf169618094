// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation router: single entry point for one inbound turn.
//!
//! The inbound-execution ledger is consulted before anything with side
//! effects runs. A completed row re-emits the cached outbound (the bus
//! dedupes delivery); a fresh in_progress row means another worker owns
//! the turn; otherwise this call claims it. A crash after the model ran
//! never invokes the model again on retry: the gate observes the earlier
//! claim or its completed result.

use std::sync::Arc;

use async_trait::async_trait;
use coreclaw_agent::AgentRuntime;
use coreclaw_bus::BusHandler;
use coreclaw_config::CoreclawConfig;
use coreclaw_context::ContextBuilder;
use coreclaw_core::{
    BusPublisher, CoreclawError, Envelope, Provider, RunKind, RunMode,
};
use coreclaw_heartbeat::HeartbeatSource;
use coreclaw_isolation::IsolatedToolRuntime;
use coreclaw_storage::{ChatRecord, LedgerGate, Storage, now_iso, now_ms};
use coreclaw_tools::{ToolContext, ToolRegistry};
use tracing::{debug, error, info, warn};

use crate::compaction;

/// Orchestrates one inbound turn end to end.
pub struct ConversationRouter {
    storage: Arc<Storage>,
    publisher: Arc<dyn BusPublisher>,
    registry: Arc<ToolRegistry>,
    agent: Arc<AgentRuntime>,
    context_builder: Arc<ContextBuilder>,
    heartbeat: Arc<HeartbeatSource>,
    provider: Arc<dyn Provider>,
    config: Arc<CoreclawConfig>,
    isolation: Option<Arc<IsolatedToolRuntime>>,
}

impl ConversationRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<Storage>,
        publisher: Arc<dyn BusPublisher>,
        registry: Arc<ToolRegistry>,
        agent: Arc<AgentRuntime>,
        context_builder: Arc<ContextBuilder>,
        heartbeat: Arc<HeartbeatSource>,
        provider: Arc<dyn Provider>,
        config: Arc<CoreclawConfig>,
        isolation: Option<Arc<IsolatedToolRuntime>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            publisher,
            registry,
            agent,
            context_builder,
            heartbeat,
            provider,
            config,
            isolation,
        })
    }

    /// Deterministic outbound id for an inbound envelope.
    pub fn outbound_id(envelope: &Envelope) -> String {
        format!(
            "outbound:{}:{}:{}",
            envelope.channel, envelope.chat_id, envelope.id
        )
    }

    /// Handle one inbound envelope. Errors propagate to the bus, which
    /// applies retry and dead-letter policy.
    pub async fn handle_inbound(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
        let chat = self
            .storage
            .get_or_create_chat(&envelope.channel, &envelope.chat_id)
            .await?;
        let mode = RunMode::derive(envelope);
        let outbound_id = Self::outbound_id(envelope);

        let now = now_ms();
        let stale_before = now - self.config.bus.processing_timeout_ms as i64;
        match self
            .storage
            .execution_gate(&envelope.id, &outbound_id, now, stale_before)
            .await?
        {
            LedgerGate::AlreadyCompleted(record) => {
                if !record.outbound_skipped {
                    let content = record.result_content.unwrap_or_default();
                    debug!(id = %envelope.id, "re-emitting completed inbound");
                    self.publish_reply(envelope, &outbound_id, &content).await?;
                }
                return Ok(());
            }
            LedgerGate::InFlight => {
                debug!(id = %envelope.id, "inbound already owned elsewhere");
                return Ok(());
            }
            LedgerGate::Started => {}
        }

        match self.run_turn(envelope, &chat, mode, &outbound_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.storage.fail_execution(&envelope.id, now_ms()).await?;
                if let Some(task_id) = scheduled_task_id(envelope) {
                    self.storage
                        .upsert_task_run(
                            task_id,
                            &envelope.id,
                            "failure",
                            Some(&err.to_string()),
                            now,
                            Some(now_ms()),
                        )
                        .await?;
                }
                error!(id = %envelope.id, error = %err, "inbound turn failed");
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        envelope: &Envelope,
        chat: &ChatRecord,
        mode: RunMode,
        outbound_id: &str,
    ) -> Result<(), CoreclawError> {
        let started = now_ms();
        let persist = (chat.registered || self.config.store_full_messages)
            && self.sender_allowed(envelope);
        if persist {
            self.storage
                .insert_message(
                    chat.id,
                    "user",
                    envelope.sender_id.as_deref(),
                    &envelope.content,
                )
                .await?;
        }

        let messages = self
            .context_builder
            .build(&self.storage, chat, envelope, mode)
            .await?;

        let ctx = ToolContext {
            storage: Arc::clone(&self.storage),
            publisher: Arc::clone(&self.publisher),
            config: Arc::clone(&self.config),
            chat: chat.clone(),
            isolation: self.isolation.clone(),
        };
        let outcome = self.agent.run(&self.registry, &ctx, messages).await?;

        if persist {
            self.storage
                .insert_message(chat.id, "assistant", None, &outcome.content)
                .await?;
        }

        let suppressed = self
            .heartbeat
            .should_suppress_outbound(chat, &outcome.content, mode.kind, now_ms())
            .await?;
        if suppressed {
            info!(id = %envelope.id, "outbound suppressed");
        } else {
            self.publish_reply(envelope, outbound_id, &outcome.content)
                .await?;
        }

        self.storage
            .complete_execution(&envelope.id, &outcome.content, suppressed, now_ms())
            .await?;

        if let Some(task_id) = scheduled_task_id(envelope) {
            self.storage
                .upsert_task_run(task_id, &envelope.id, "success", None, started, Some(now_ms()))
                .await?;
        }

        if mode.kind != RunKind::Heartbeat {
            self.heartbeat.wake(&envelope.channel, &envelope.chat_id).await;
        }

        self.maybe_compact(chat.id).await?;
        Ok(())
    }

    async fn publish_reply(
        &self,
        envelope: &Envelope,
        outbound_id: &str,
        content: &str,
    ) -> Result<(), CoreclawError> {
        let reply = Envelope {
            id: outbound_id.to_string(),
            channel: envelope.channel.clone(),
            chat_id: envelope.chat_id.clone(),
            sender_id: None,
            content: content.to_string(),
            created_at: now_iso(),
            metadata: None,
        };
        self.publisher.publish_outbound(reply).await?;
        Ok(())
    }

    fn sender_allowed(&self, envelope: &Envelope) -> bool {
        let allowlist = &self.config.allowed_channel_identities;
        if allowlist.is_empty() {
            return true;
        }
        match &envelope.sender_id {
            Some(sender) => allowlist.iter().any(|id| id == sender),
            // Synthetic sources have no external identity to check.
            None => true,
        }
    }

    /// Trigger background compaction once the stored history doubles the
    /// cap.
    async fn maybe_compact(&self, chat_fk: i64) -> Result<(), CoreclawError> {
        let count = self.storage.message_count(chat_fk).await?;
        let threshold = (self.config.history_max_messages * 2) as u64;
        if count <= threshold {
            return Ok(());
        }
        let storage = Arc::clone(&self.storage);
        let provider = Arc::clone(&self.provider);
        let model = self.config.provider.model.clone();
        let history_max = self.config.history_max_messages;
        tokio::spawn(async move {
            if let Err(err) =
                compaction::compact_chat(&storage, &provider, &model, chat_fk, history_max).await
            {
                warn!(chat = chat_fk, error = %err, "background compaction failed");
            }
        });
        Ok(())
    }
}

fn scheduled_task_id(envelope: &Envelope) -> Option<i64> {
    if !envelope.is_scheduled_task() {
        return None;
    }
    envelope
        .metadata
        .as_ref()
        .and_then(|m| m.get("taskId"))
        .and_then(|v| v.as_i64())
}

#[async_trait]
impl BusHandler for ConversationRouter {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
        self.handle_inbound(envelope).await
    }
}
