// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable message bus.
//!
//! Two FIFO queues (inbound, outbound) backed by the `bus_queue` table.
//! Publish is idempotent per (direction, id) via the dedupe table; overflow
//! and per-chat rate violations are recorded as dead_letter without being
//! thrown. One dispatch task per direction claims due records and invokes
//! the registered handlers sequentially under the processing deadline;
//! failures retry with exponential backoff until attempts are exhausted,
//! then dead-letter for admin replay.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coreclaw_config::BusConfig;
use coreclaw_core::{BusPublisher, CoreclawError, Direction, Envelope};
use coreclaw_storage::{
    FailureDisposition, PublishOutcome, PublishRequest, QueueRecord, ReplaySelector, Storage,
    now_ms,
};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A consumer of dispatched envelopes. The router is the inbound handler;
/// the channel mux is the outbound handler.
#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CoreclawError>;
}

/// The durable bus. Cheap to clone via `Arc`.
pub struct MessageBus {
    storage: Arc<Storage>,
    config: BusConfig,
    inbound_handlers: RwLock<Vec<Arc<dyn BusHandler>>>,
    outbound_handlers: RwLock<Vec<Arc<dyn BusHandler>>>,
    cancel: CancellationToken,
    dispatch_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl MessageBus {
    pub fn new(storage: Arc<Storage>, config: BusConfig) -> Arc<Self> {
        Arc::new(Self {
            storage,
            config,
            inbound_handlers: RwLock::new(Vec::new()),
            outbound_handlers: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
            dispatch_tasks: Mutex::new(Vec::new()),
        })
    }

    /// Register a handler invoked for every dispatched inbound record.
    pub async fn register_inbound_handler(&self, handler: Arc<dyn BusHandler>) {
        self.inbound_handlers.write().await.push(handler);
    }

    /// Register a handler invoked for every dispatched outbound record.
    pub async fn register_outbound_handler(&self, handler: Arc<dyn BusHandler>) {
        self.outbound_handlers.write().await.push(handler);
    }

    /// Recover marooned records from a previous crash and start one
    /// dispatch task per direction.
    pub async fn start(self: &Arc<Self>) -> Result<(), CoreclawError> {
        let recovered = self
            .storage
            .recover_stale(self.config.processing_timeout_ms, now_ms())
            .await?;
        if recovered > 0 {
            info!(recovered, "returned stale processing records to pending");
        }

        let mut tasks = self.dispatch_tasks.lock().await;
        if !tasks.is_empty() {
            return Ok(());
        }
        for direction in [Direction::Inbound, Direction::Outbound] {
            let bus = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                bus.dispatch_loop(direction).await;
            }));
        }
        info!("bus dispatch started");
        Ok(())
    }

    /// Stop dispatching. Idempotent; waits for in-flight handlers, which
    /// are themselves bounded by the processing deadline.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let mut tasks = self.dispatch_tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(error = %err, "dispatch task join failed");
            }
        }
        info!("bus dispatch stopped");
    }

    async fn dispatch_loop(self: Arc<Self>, direction: Direction) {
        let poll = Duration::from_millis(self.config.poll_ms);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(%direction, "dispatch loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(poll) => {}
            }

            match self.dispatch_once(direction).await {
                Ok(_) => {}
                Err(err) => error!(%direction, error = %err, "dispatch pass failed"),
            }
        }
    }

    /// Claim and process one batch. Returns the number of records handled.
    /// Exposed for deterministic tests; the dispatch loop calls it on every
    /// poll tick.
    pub async fn dispatch_once(&self, direction: Direction) -> Result<usize, CoreclawError> {
        let claimed = self
            .storage
            .claim_batch(&direction.to_string(), self.config.batch_size, now_ms())
            .await?;
        let count = claimed.len();

        for record in claimed {
            if self.cancel.is_cancelled() {
                break;
            }
            self.apply_overload_backoff(direction).await?;
            self.process_record(direction, record).await?;
        }
        Ok(count)
    }

    async fn apply_overload_backoff(&self, direction: Direction) -> Result<(), CoreclawError> {
        let (pending, _, _) = self
            .storage
            .queue_status_counts(&direction.to_string())
            .await?;
        if pending as usize > self.config.overload_pending_threshold {
            debug!(%direction, pending, "overload threshold exceeded, backing off");
            tokio::time::sleep(Duration::from_millis(self.config.overload_backoff_ms)).await;
        }
        Ok(())
    }

    async fn process_record(
        &self,
        direction: Direction,
        record: QueueRecord,
    ) -> Result<(), CoreclawError> {
        let envelope: Envelope = match serde_json::from_str(&record.payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(queue_id = record.id, error = %err, "malformed payload");
                self.record_failure(&record, &format!("malformed payload: {err}"))
                    .await?;
                return Ok(());
            }
        };

        let handlers = match direction {
            Direction::Inbound => self.inbound_handlers.read().await.clone(),
            Direction::Outbound => self.outbound_handlers.read().await.clone(),
        };

        let deadline = Duration::from_millis(self.config.processing_timeout_ms);
        let result = tokio::time::timeout(deadline, async {
            for handler in &handlers {
                handler.handle(&envelope).await?;
            }
            Ok::<(), CoreclawError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                self.storage.mark_processed(record.id).await?;
                debug!(queue_id = record.id, %direction, "record processed");
            }
            Ok(Err(err)) => {
                self.record_failure(&record, &err.to_string()).await?;
            }
            Err(_) => {
                let timeout_err = CoreclawError::HandlerTimeout {
                    ms: self.config.processing_timeout_ms,
                };
                self.record_failure(&record, &timeout_err.to_string()).await?;
            }
        }
        Ok(())
    }

    async fn record_failure(&self, record: &QueueRecord, error_text: &str) -> Result<(), CoreclawError> {
        let disposition = self
            .storage
            .mark_failed(
                record.id,
                error_text,
                self.config.retry_backoff_ms,
                self.config.max_retry_backoff_ms,
                now_ms(),
            )
            .await?;
        match disposition {
            FailureDisposition::Retrying { next_attempt_at } => {
                warn!(
                    queue_id = record.id,
                    attempts = record.attempts + 1,
                    next_attempt_at,
                    error = error_text,
                    "handler failed, will retry"
                );
            }
            FailureDisposition::DeadLettered => {
                error!(queue_id = record.id, error = error_text, "record dead-lettered");
            }
        }
        Ok(())
    }

    async fn publish(
        &self,
        direction: Direction,
        envelope: Envelope,
    ) -> Result<Option<i64>, CoreclawError> {
        let max_pending = match direction {
            Direction::Inbound => self.config.max_pending_inbound,
            Direction::Outbound => self.config.max_pending_outbound,
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| CoreclawError::Internal(format!("failed to encode envelope: {e}")))?;
        let outcome = self
            .storage
            .publish(PublishRequest {
                direction: direction.to_string(),
                message_id: envelope.id.clone(),
                payload,
                channel: envelope.channel.clone(),
                chat_id: envelope.chat_id.clone(),
                max_attempts: self.config.max_attempts,
                max_pending,
                rate_limit_window_ms: self.config.per_chat_rate_limit_window_ms,
                rate_limit_max: match direction {
                    Direction::Inbound => self.config.per_chat_rate_limit_max,
                    Direction::Outbound => 0,
                },
                now_ms: now_ms(),
            })
            .await?;

        match outcome {
            PublishOutcome::Enqueued(queue_id) => Ok(Some(queue_id)),
            PublishOutcome::Duplicate => {
                debug!(id = %envelope.id, %direction, "duplicate publish ignored");
                Ok(None)
            }
            PublishOutcome::DeadLettered { queue_id, reason } => {
                warn!(id = %envelope.id, %direction, reason, "publish dead-lettered");
                Ok(Some(queue_id))
            }
        }
    }

    /// List dead_letter records, optionally filtered by direction.
    pub async fn list_dead_letter_messages(
        &self,
        direction: Option<Direction>,
        limit: usize,
    ) -> Result<Vec<QueueRecord>, CoreclawError> {
        let direction = direction.map(|d| d.to_string());
        self.storage
            .list_dead_letter(direction.as_deref(), limit)
            .await
    }

    /// Move selected dead_letter records back to pending with fresh attempts.
    pub async fn replay_dead_letter_messages(
        &self,
        selector: ReplaySelector,
        limit: usize,
    ) -> Result<Vec<i64>, CoreclawError> {
        self.storage.replay_dead_letter(selector, limit).await
    }

    /// (pending, processing, dead_letter) counts for one direction.
    pub async fn status_counts(&self, direction: Direction) -> Result<(u64, u64, u64), CoreclawError> {
        self.storage.queue_status_counts(&direction.to_string()).await
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }
}

#[async_trait]
impl BusPublisher for MessageBus {
    async fn publish_inbound(&self, envelope: Envelope) -> Result<Option<i64>, CoreclawError> {
        self.publish(Direction::Inbound, envelope).await
    }

    async fn publish_outbound(&self, envelope: Envelope) -> Result<Option<i64>, CoreclawError> {
        self.publish(Direction::Outbound, envelope).await
    }
}
