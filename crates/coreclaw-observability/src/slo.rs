// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SLO threshold evaluation and webhook alerting.
//!
//! The watcher snapshots the metrics on an interval, compares against the
//! configured thresholds, and POSTs one JSON alert per breach with a
//! cooldown so a persistent breach does not flood the webhook.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use coreclaw_bus::MessageBus;
use coreclaw_config::SloConfig;
use coreclaw_core::{CoreclawError, Direction};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::{Metrics, MetricsSnapshot, QueueGauges};

/// One threshold breach found during an evaluation pass.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Breach {
    /// Stable key identifying the breach family (cooldown granularity).
    pub kind: String,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Evaluate a snapshot against the thresholds.
pub fn evaluate(config: &SloConfig, snapshot: &MetricsSnapshot) -> Vec<Breach> {
    let mut breaches = Vec::new();

    let pending = snapshot.bus_inbound.pending + snapshot.bus_outbound.pending;
    if pending > config.max_pending_queue {
        breaches.push(Breach {
            kind: "pending_queue".to_string(),
            message: format!("pending queue depth {pending} exceeds {}", config.max_pending_queue),
            value: pending as f64,
            threshold: config.max_pending_queue as f64,
        });
    }

    let dead = snapshot.bus_inbound.dead_letter + snapshot.bus_outbound.dead_letter;
    if dead > config.max_dead_letter_queue {
        breaches.push(Breach {
            kind: "dead_letter_queue".to_string(),
            message: format!(
                "dead-letter depth {dead} exceeds {}",
                config.max_dead_letter_queue
            ),
            value: dead as f64,
            threshold: config.max_dead_letter_queue as f64,
        });
    }

    for (tool, stats) in &snapshot.tools {
        let rate = stats.failure_rate();
        if stats.calls >= 5 && rate > config.max_tool_failure_rate {
            breaches.push(Breach {
                kind: format!("tool_failure_rate:{tool}"),
                message: format!(
                    "tool {tool} failure rate {rate:.2} exceeds {:.2}",
                    config.max_tool_failure_rate
                ),
                value: rate,
                threshold: config.max_tool_failure_rate,
            });
        }
    }

    if snapshot.scheduler.max_delay_ms > config.max_scheduler_delay_ms {
        breaches.push(Breach {
            kind: "scheduler_delay".to_string(),
            message: format!(
                "scheduler max delay {}ms exceeds {}ms",
                snapshot.scheduler.max_delay_ms, config.max_scheduler_delay_ms
            ),
            value: snapshot.scheduler.max_delay_ms as f64,
            threshold: config.max_scheduler_delay_ms as f64,
        });
    }

    for (server, stats) in &snapshot.mcp {
        let rate = stats.failure_rate();
        if stats.calls >= 5 && rate > config.max_mcp_failure_rate {
            breaches.push(Breach {
                kind: format!("mcp_failure_rate:{server}"),
                message: format!(
                    "mcp server {server} failure rate {rate:.2} exceeds {:.2}",
                    config.max_mcp_failure_rate
                ),
                value: rate,
                threshold: config.max_mcp_failure_rate,
            });
        }
    }

    breaches
}

/// Periodic SLO watcher with webhook alerting.
pub struct SloWatcher {
    config: SloConfig,
    metrics: Arc<Metrics>,
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    /// Breach kind -> last alert unix ms.
    last_alert: Mutex<HashMap<String, i64>>,
    cancel: CancellationToken,
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    source: &'static str,
    breach: &'a Breach,
    at: String,
}

impl SloWatcher {
    pub fn new(config: SloConfig, metrics: Arc<Metrics>, bus: Arc<MessageBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            metrics,
            bus,
            client: reqwest::Client::new(),
            last_alert: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Spawn the watcher loop.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let interval = Duration::from_millis(watcher.config.check_interval_ms);
            loop {
                tokio::select! {
                    _ = watcher.cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = watcher.check_once().await {
                    warn!(error = %err, "slo check failed");
                }
            }
        })
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Snapshot the metrics with live queue gauges.
    pub async fn snapshot(&self) -> Result<MetricsSnapshot, CoreclawError> {
        let (in_pending, in_processing, in_dead) =
            self.bus.status_counts(Direction::Inbound).await?;
        let (out_pending, out_processing, out_dead) =
            self.bus.status_counts(Direction::Outbound).await?;
        Ok(self.metrics.snapshot(
            QueueGauges {
                pending: in_pending,
                processing: in_processing,
                dead_letter: in_dead,
            },
            QueueGauges {
                pending: out_pending,
                processing: out_processing,
                dead_letter: out_dead,
            },
        ))
    }

    /// One evaluation pass; exposed for tests.
    pub async fn check_once(&self) -> Result<Vec<Breach>, CoreclawError> {
        let snapshot = self.snapshot().await?;
        let breaches = evaluate(&self.config, &snapshot);
        for breach in &breaches {
            self.alert(breach).await;
        }
        Ok(breaches)
    }

    async fn alert(&self, breach: &Breach) {
        let Some(url) = &self.config.alert_webhook_url else {
            debug!(kind = breach.kind, "breach detected, alerting disabled");
            return;
        };

        let now = chrono_ms();
        {
            let mut last = self.last_alert.lock().await;
            if let Some(previous) = last.get(&breach.kind)
                && now - previous < self.config.alert_cooldown_ms as i64
            {
                debug!(kind = breach.kind, "alert suppressed by cooldown");
                return;
            }
            last.insert(breach.kind.clone(), now);
        }

        let payload = AlertPayload {
            source: "coreclaw",
            breach,
            at: chrono::Utc::now().to_rfc3339(),
        };
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(kind = breach.kind, "slo alert delivered");
            }
            Ok(response) => {
                warn!(kind = breach.kind, status = %response.status(), "slo alert rejected");
            }
            Err(err) => {
                warn!(kind = breach.kind, error = %err, "slo alert failed");
            }
        }
    }
}

fn chrono_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
