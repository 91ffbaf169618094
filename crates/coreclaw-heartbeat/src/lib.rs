// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heartbeat source: periodic wake-emitter per chat.
//!
//! Wake events come from the interval timer or are forced externally (the
//! router wakes a chat after every non-heartbeat turn). Wakes coalesce
//! within the debounce window, respect active hours, defer while the chat
//! has inbound work in flight, and are capped per dispatch pass. After the
//! agent answers a heartbeat turn, the ack token and recent duplicates are
//! suppressed before the outbound is published.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use coreclaw_config::{HeartbeatConfig, parse_active_hours};
use coreclaw_core::{BusPublisher, CoreclawError, Envelope, RunKind};
use coreclaw_storage::{ChatRecord, Storage, now_iso, now_ms};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Key under which the last delivered heartbeat content is remembered.
fn dedupe_key(channel: &str, chat_id: &str) -> String {
    format!("heartbeat.last.{channel}.{chat_id}")
}

/// The per-chat wake emitter.
pub struct HeartbeatSource {
    config: HeartbeatConfig,
    workspace_dir: PathBuf,
    storage: Arc<Storage>,
    publisher: Arc<dyn BusPublisher>,
    /// (channel, chat_id) -> earliest dispatch time (unix ms). Overwritten
    /// by newer wakes, so only the latest within the debounce window wins.
    pending: Mutex<HashMap<(String, String), i64>>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HeartbeatSource {
    pub fn new(
        config: HeartbeatConfig,
        workspace_dir: PathBuf,
        storage: Arc<Storage>,
        publisher: Arc<dyn BusPublisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            workspace_dir,
            storage,
            publisher,
            pending: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Queue a wake for one chat, debounced.
    pub async fn wake(&self, channel: &str, chat_id: &str) {
        if !self.config.enabled {
            return;
        }
        let dispatch_at = now_ms() + self.config.wake_debounce_ms as i64;
        self.pending
            .lock()
            .await
            .insert((channel.to_string(), chat_id.to_string()), dispatch_at);
        debug!(channel, chat_id, "heartbeat wake queued");
    }

    /// Spawn the interval + dispatch loop.
    pub async fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            info!("heartbeat disabled");
            return;
        }
        let mut slot = self.task.lock().await;
        if slot.is_some() {
            return;
        }
        let source = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            let interval = Duration::from_millis(source.config.interval_ms.max(1_000));
            let poll = Duration::from_millis(source.config.wake_debounce_ms.clamp(100, 1_000));
            let mut next_interval = tokio::time::Instant::now() + interval;
            info!("heartbeat source started");
            loop {
                tokio::select! {
                    _ = source.cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(next_interval) => {
                        next_interval += interval;
                        if let Err(err) = source.wake_all().await {
                            error!(error = %err, "heartbeat interval wake failed");
                        }
                    }
                    _ = tokio::time::sleep(poll) => {
                        if let Err(err) = source.dispatch_due(now_ms()).await {
                            error!(error = %err, "heartbeat dispatch failed");
                        }
                    }
                }
            }
        }));
    }

    /// Stop the loop. Idempotent.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().await.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "heartbeat task join failed");
        }
    }

    /// Queue a wake for every registered chat.
    pub async fn wake_all(&self) -> Result<(), CoreclawError> {
        for chat in self.storage.list_registered_chats().await? {
            self.wake(&chat.channel, &chat.chat_id).await;
        }
        Ok(())
    }

    /// Dispatch due wakes, bounded by `max_dispatch_per_run`. Returns the
    /// number of heartbeat envelopes emitted.
    pub async fn dispatch_due(&self, now: i64) -> Result<usize, CoreclawError> {
        let due: Vec<(String, String)> = {
            let pending = self.pending.lock().await;
            pending
                .iter()
                .filter(|(_, dispatch_at)| **dispatch_at <= now)
                .take(self.config.max_dispatch_per_run)
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut emitted = 0;
        for (channel, chat_id) in due {
            if !self.within_active_hours(minute_of_day_local()) {
                // Outside the window the wake is dropped; the interval
                // timer queues a fresh one later.
                self.pending
                    .lock()
                    .await
                    .remove(&(channel.clone(), chat_id.clone()));
                debug!(channel, chat_id, "heartbeat outside active hours");
                continue;
            }

            if self.config.skip_when_inbound_busy
                && self.storage.chat_inbound_busy(&channel, &chat_id).await?
            {
                self.pending
                    .lock()
                    .await
                    .insert((channel.clone(), chat_id.clone()), now + self.config.wake_retry_ms as i64);
                debug!(channel, chat_id, "heartbeat deferred, chat busy");
                continue;
            }

            self.pending
                .lock()
                .await
                .remove(&(channel.clone(), chat_id.clone()));
            self.emit(&channel, &chat_id).await?;
            emitted += 1;
        }
        Ok(emitted)
    }

    async fn emit(&self, channel: &str, chat_id: &str) -> Result<(), CoreclawError> {
        let prompt = self.prompt_text().await;
        let envelope = Envelope {
            id: format!("heartbeat:{}", uuid::Uuid::new_v4()),
            channel: channel.to_string(),
            chat_id: chat_id.to_string(),
            sender_id: Some("heartbeat".to_string()),
            content: prompt,
            created_at: now_iso(),
            metadata: Some(serde_json::json!({"isHeartbeat": true})),
        };
        self.publisher.publish_inbound(envelope).await?;
        debug!(channel, chat_id, "heartbeat emitted");
        Ok(())
    }

    async fn prompt_text(&self) -> String {
        let path = self.workspace_dir.join(&self.config.prompt_path);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => "Heartbeat check-in: review pending work and follow up if needed.".to_string(),
        }
    }

    /// Whether a heartbeat may fire at the given local minute of day.
    pub fn within_active_hours(&self, minute: u32) -> bool {
        if self.config.active_hours.is_empty() {
            return true;
        }
        match parse_active_hours(&self.config.active_hours) {
            Some((start, end)) if start <= end => minute >= start && minute < end,
            // Window wraps midnight.
            Some((start, end)) => minute >= start || minute < end,
            None => true,
        }
    }

    /// Decide whether an assistant reply to a heartbeat turn should be
    /// dropped instead of published, and remember delivered content for the
    /// duplicate window.
    pub async fn should_suppress_outbound(
        &self,
        chat: &ChatRecord,
        content: &str,
        run_kind: RunKind,
        now: i64,
    ) -> Result<bool, CoreclawError> {
        if run_kind != RunKind::Heartbeat {
            return Ok(false);
        }

        if self.config.suppress_ack && content.trim() == self.config.ack_token {
            debug!(chat = chat.id, "heartbeat ack suppressed");
            return Ok(true);
        }

        let key = dedupe_key(&chat.channel, &chat.chat_id);
        if let Some(previous) = self.storage.meta_get(&key).await?
            && let Some((ts, prev_content)) = previous.split_once('|')
        {
            let ts: i64 = ts.parse().unwrap_or(0);
            if prev_content == content && now - ts < self.config.dedupe_window_ms as i64 {
                debug!(chat = chat.id, "duplicate heartbeat content suppressed");
                return Ok(true);
            }
        }

        self.storage
            .meta_set(&key, &format!("{now}|{content}"), now)
            .await?;
        Ok(false)
    }
}

fn minute_of_day_local() -> u32 {
    use chrono::Timelike;
    let local = chrono::Local::now();
    local.hour() * 60 + local.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct CapturingPublisher {
        envelopes: StdMutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl BusPublisher for CapturingPublisher {
        async fn publish_inbound(&self, envelope: Envelope) -> Result<Option<i64>, CoreclawError> {
            self.envelopes.lock().unwrap().push(envelope);
            Ok(Some(1))
        }

        async fn publish_outbound(&self, _envelope: Envelope) -> Result<Option<i64>, CoreclawError> {
            Ok(None)
        }
    }

    async fn setup(
        config: HeartbeatConfig,
    ) -> (
        Arc<HeartbeatSource>,
        Arc<Storage>,
        Arc<CapturingPublisher>,
        ChatRecord,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(coreclaw_storage::open_in_dir(dir.path()).await.unwrap());
        let chat = storage.get_or_create_chat("cli", "alice").await.unwrap();
        storage.set_chat_registered(chat.id, true).await.unwrap();
        let chat = storage.get_chat(chat.id).await.unwrap().unwrap();
        let publisher = Arc::new(CapturingPublisher {
            envelopes: StdMutex::new(Vec::new()),
        });
        let source = HeartbeatSource::new(
            config,
            dir.path().to_path_buf(),
            Arc::clone(&storage),
            publisher.clone(),
        );
        (source, storage, publisher, chat, dir)
    }

    fn enabled_config() -> HeartbeatConfig {
        HeartbeatConfig {
            enabled: true,
            wake_debounce_ms: 0,
            ..HeartbeatConfig::default()
        }
    }

    #[tokio::test]
    async fn wake_then_dispatch_emits_heartbeat_envelope() {
        let (source, _storage, publisher, chat, _dir) = setup(enabled_config()).await;

        source.wake(&chat.channel, &chat.chat_id).await;
        let emitted = source.dispatch_due(now_ms() + 1).await.unwrap();
        assert_eq!(emitted, 1);

        let envelopes = publisher.envelopes.lock().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].sender_id.as_deref(), Some("heartbeat"));
        assert!(envelopes[0].is_heartbeat());
    }

    #[tokio::test]
    async fn wakes_coalesce_within_debounce() {
        let mut config = enabled_config();
        config.wake_debounce_ms = 60_000;
        let (source, _storage, publisher, chat, _dir) = setup(config).await;

        for _ in 0..5 {
            source.wake(&chat.channel, &chat.chat_id).await;
        }
        // Not yet due: the debounce window is still open.
        assert_eq!(source.dispatch_due(now_ms()).await.unwrap(), 0);
        // After the window, exactly one heartbeat fires.
        let later = now_ms() + 61_000;
        assert_eq!(source.dispatch_due(later).await.unwrap(), 1);
        assert_eq!(publisher.envelopes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn busy_chat_defers_wake() {
        let (source, storage, publisher, chat, _dir) = setup(enabled_config()).await;

        // Park an inbound record in pending for this chat.
        storage
            .publish(coreclaw_storage::PublishRequest {
                direction: "inbound".to_string(),
                message_id: "busy-1".to_string(),
                payload: "{}".to_string(),
                channel: chat.channel.clone(),
                chat_id: chat.chat_id.clone(),
                max_attempts: 3,
                max_pending: 100,
                rate_limit_window_ms: 0,
                rate_limit_max: 0,
                now_ms: now_ms(),
            })
            .await
            .unwrap();

        source.wake(&chat.channel, &chat.chat_id).await;
        assert_eq!(source.dispatch_due(now_ms() + 1).await.unwrap(), 0);
        assert!(publisher.envelopes.lock().unwrap().is_empty());
        // The wake was deferred, not dropped.
        assert_eq!(source.pending.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn max_dispatch_per_run_caps_a_pass() {
        let mut config = enabled_config();
        config.max_dispatch_per_run = 2;
        config.skip_when_inbound_busy = false;
        let (source, storage, publisher, _chat, _dir) = setup(config).await;

        for i in 0..5 {
            let chat = storage
                .get_or_create_chat("cli", &format!("user-{i}"))
                .await
                .unwrap();
            storage.set_chat_registered(chat.id, true).await.unwrap();
        }
        source.wake_all().await.unwrap();

        let emitted = source.dispatch_due(now_ms() + 1).await.unwrap();
        assert_eq!(emitted, 2);
        assert_eq!(publisher.envelopes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn active_hours_gate() {
        let mut config = enabled_config();
        config.active_hours = "09:00-17:00".to_string();
        let (source, _storage, _publisher, _chat, _dir) = setup(config).await;

        assert!(!source.within_active_hours(8 * 60 + 59));
        assert!(source.within_active_hours(9 * 60));
        assert!(source.within_active_hours(12 * 60));
        assert!(!source.within_active_hours(17 * 60));

        // Window wrapping midnight.
        let mut config = enabled_config();
        config.active_hours = "22:00-06:00".to_string();
        let (source, _storage, _publisher, _chat, _dir) = setup(config).await;
        assert!(source.within_active_hours(23 * 60));
        assert!(source.within_active_hours(60));
        assert!(!source.within_active_hours(12 * 60));
    }

    #[tokio::test]
    async fn ack_token_is_suppressed() {
        let mut config = enabled_config();
        config.ack_token = "HEARTBEAT_OK".to_string();
        config.suppress_ack = true;
        let (source, _storage, _publisher, chat, _dir) = setup(config).await;

        assert!(
            source
                .should_suppress_outbound(&chat, "HEARTBEAT_OK", RunKind::Heartbeat, 1_000)
                .await
                .unwrap()
        );
        assert!(
            !source
                .should_suppress_outbound(&chat, "real content", RunKind::Heartbeat, 1_000)
                .await
                .unwrap()
        );
        // Non-heartbeat runs are never suppressed.
        assert!(
            !source
                .should_suppress_outbound(&chat, "HEARTBEAT_OK", RunKind::Chat, 1_000)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn duplicate_content_is_suppressed_within_window() {
        let mut config = enabled_config();
        config.dedupe_window_ms = 10_000;
        let (source, _storage, _publisher, chat, _dir) = setup(config).await;

        assert!(
            !source
                .should_suppress_outbound(&chat, "reminder: standup", RunKind::Heartbeat, 1_000)
                .await
                .unwrap()
        );
        // Identical content inside the window is dropped.
        assert!(
            source
                .should_suppress_outbound(&chat, "reminder: standup", RunKind::Heartbeat, 5_000)
                .await
                .unwrap()
        );
        // Different content goes through.
        assert!(
            !source
                .should_suppress_outbound(&chat, "something new", RunKind::Heartbeat, 6_000)
                .await
                .unwrap()
        );
        // Identical content after the window goes through again.
        assert!(
            !source
                .should_suppress_outbound(&chat, "reminder: standup", RunKind::Heartbeat, 50_000)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn disabled_source_ignores_wakes() {
        let (source, _storage, publisher, chat, _dir) =
            setup(HeartbeatConfig::default()).await;
        source.wake(&chat.channel, &chat.chat_id).await;
        assert_eq!(source.dispatch_due(now_ms() + 1).await.unwrap(), 0);
        assert!(publisher.envelopes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_file_is_used_when_present() {
        let (source, _storage, publisher, chat, dir) = setup(enabled_config()).await;
        std::fs::write(dir.path().join("HEARTBEAT.md"), "custom heartbeat prompt").unwrap();

        source.wake(&chat.channel, &chat.chat_id).await;
        source.dispatch_due(now_ms() + 1).await.unwrap();
        assert_eq!(
            publisher.envelopes.lock().unwrap()[0].content,
            "custom heartbeat prompt"
        );
    }
}
