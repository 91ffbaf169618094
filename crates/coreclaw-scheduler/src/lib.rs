// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler: a periodic tick that finds due tasks and emits synthetic
//! inbound messages.
//!
//! Each due task is checkpointed (next run advanced, one-shots marked
//! done) atomically BEFORE its envelope is published, so a crash between
//! the two leaves at most one missed prompt, never a duplicate storm. The
//! envelope id is derived from the task id and the observed fire time, so
//! re-publishing after a crash deduplicates on the bus.

pub mod schedule;

use std::sync::Arc;
use std::time::Duration;

use coreclaw_core::{BusPublisher, CoreclawError, Envelope};
use coreclaw_observability::Metrics;
use coreclaw_storage::{Storage, TaskRecord, now_iso, now_ms};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use schedule::{initial_next_run, next_run_after_firing, parse_cron};

/// The periodic task scheduler.
pub struct Scheduler {
    storage: Arc<Storage>,
    publisher: Arc<dyn BusPublisher>,
    metrics: Arc<Metrics>,
    tick_ms: u64,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        storage: Arc<Storage>,
        publisher: Arc<dyn BusPublisher>,
        metrics: Arc<Metrics>,
        tick_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            publisher,
            metrics,
            tick_ms,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Spawn the tick loop.
    pub async fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().await;
        if slot.is_some() {
            return;
        }
        let scheduler = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let tick = Duration::from_millis(scheduler.tick_ms);
            info!(tick_ms = scheduler.tick_ms, "scheduler started");
            loop {
                tokio::select! {
                    _ = scheduler.cancel.cancelled() => return,
                    _ = tokio::time::sleep(tick) => {}
                }
                if let Err(err) = scheduler.tick().await {
                    error!(error = %err, "scheduler tick failed");
                }
            }
        }));
    }

    /// Stop the tick loop. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "scheduler task join failed");
        }
    }

    /// One pass over due tasks; exposed for deterministic tests.
    pub async fn tick(&self) -> Result<usize, CoreclawError> {
        let now = now_ms();
        let due = self.storage.due_tasks(now).await?;
        let mut dispatched = 0;

        for task in due {
            match self.fire(&task, now).await {
                Ok(true) => dispatched += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(task = task.id, error = %err, "task dispatch failed");
                }
            }
        }
        if dispatched > 0 {
            debug!(dispatched, "scheduler tick dispatched tasks");
        }
        Ok(dispatched)
    }

    async fn fire(&self, task: &TaskRecord, now: i64) -> Result<bool, CoreclawError> {
        let Some(observed_next_run_at) = task.next_run_at else {
            return Ok(false);
        };

        let next = schedule::next_run_after_firing(&task.schedule_type, &task.schedule_value, now)?;
        let new_status = if next.is_some() { "active" } else { "done" };

        // Checkpoint before dispatch: losing the conditional update means
        // another pass already fired this slot.
        let won = self
            .storage
            .checkpoint_task(task.id, observed_next_run_at, next, new_status)
            .await?;
        if !won {
            return Ok(false);
        }

        let chat = self
            .storage
            .get_chat(task.chat_fk)
            .await?
            .ok_or_else(|| CoreclawError::Internal(format!("task {} has no chat", task.id)))?;

        let envelope = Envelope {
            id: format!("task:{}:{}", task.id, observed_next_run_at),
            channel: chat.channel.clone(),
            chat_id: chat.chat_id.clone(),
            sender_id: Some("scheduler".to_string()),
            content: task.prompt.clone(),
            created_at: now_iso(),
            metadata: Some(serde_json::json!({
                "isScheduledTask": true,
                "taskId": task.id,
                "contextMode": task.context_mode,
                "chatFk": task.chat_fk,
            })),
        };
        self.publisher.publish_inbound(envelope).await?;

        let delay_ms = (now - observed_next_run_at).max(0) as u64;
        self.metrics.record_scheduler_dispatch(1, delay_ms);
        debug!(task = task.id, delay_ms, "task dispatched");
        Ok(true)
    }
}
