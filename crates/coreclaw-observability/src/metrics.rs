// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory metric aggregation.
//!
//! Counters live in plain mutex'd maps; a point-in-time [`MetricsSnapshot`]
//! feeds the /status endpoint, the Prometheus text rendering, and the SLO
//! threshold checks.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Per-tool call statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStats {
    pub calls: u64,
    pub failures: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl ToolStats {
    pub fn failure_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.failures as f64 / self.calls as f64
        }
    }
}

/// Scheduler dispatch statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub dispatches: u64,
    pub tasks: u64,
    pub total_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Per-MCP-server call statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct McpStats {
    pub calls: u64,
    pub failures: u64,
}

impl McpStats {
    pub fn failure_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.failures as f64 / self.calls as f64
        }
    }
}

/// Queue gauges for one direction, read from storage at snapshot time.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueGauges {
    pub pending: u64,
    pub processing: u64,
    pub dead_letter: u64,
}

/// Point-in-time aggregate of every metric family.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub tools: BTreeMap<String, ToolStats>,
    pub scheduler: SchedulerStats,
    pub bus_inbound: QueueGauges,
    pub bus_outbound: QueueGauges,
    pub mcp: BTreeMap<String, McpStats>,
}

#[derive(Default)]
struct MetricsInner {
    tools: BTreeMap<String, ToolStats>,
    scheduler: SchedulerStats,
    mcp: BTreeMap<String, McpStats>,
}

/// The runtime-wide metric registry.
pub struct Metrics {
    inner: Mutex<MetricsInner>,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::default()),
            started_at: Instant::now(),
        }
    }

    pub fn record_tool_call(&self, tool: &str, ok: bool, latency_ms: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let stats = inner.tools.entry(tool.to_string()).or_default();
        stats.calls += 1;
        if !ok {
            stats.failures += 1;
        }
        stats.total_latency_ms += latency_ms;
        stats.max_latency_ms = stats.max_latency_ms.max(latency_ms);
    }

    pub fn record_scheduler_dispatch(&self, task_count: u64, delay_ms: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.scheduler.dispatches += 1;
        inner.scheduler.tasks += task_count;
        inner.scheduler.total_delay_ms += delay_ms;
        inner.scheduler.max_delay_ms = inner.scheduler.max_delay_ms.max(delay_ms);
    }

    pub fn record_mcp_call(&self, server: &str, ok: bool) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let stats = inner.mcp.entry(server.to_string()).or_default();
        stats.calls += 1;
        if !ok {
            stats.failures += 1;
        }
    }

    /// Snapshot the counters, combining in the queue gauges read by the
    /// caller.
    pub fn snapshot(&self, bus_inbound: QueueGauges, bus_outbound: QueueGauges) -> MetricsSnapshot {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            tools: inner.tools.clone(),
            scheduler: inner.scheduler.clone(),
            bus_inbound,
            bus_outbound,
            mcp: inner.mcp.clone(),
        }
    }
}

/// Render a snapshot in Prometheus text exposition format.
pub fn render_prometheus(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();

    out.push_str("# TYPE coreclaw_uptime_seconds gauge\n");
    out.push_str(&format!("coreclaw_uptime_seconds {}\n", snapshot.uptime_secs));

    out.push_str("# TYPE coreclaw_tool_calls_total counter\n");
    for (tool, stats) in &snapshot.tools {
        out.push_str(&format!(
            "coreclaw_tool_calls_total{{tool=\"{tool}\"}} {}\n",
            stats.calls
        ));
    }
    out.push_str("# TYPE coreclaw_tool_failures_total counter\n");
    for (tool, stats) in &snapshot.tools {
        out.push_str(&format!(
            "coreclaw_tool_failures_total{{tool=\"{tool}\"}} {}\n",
            stats.failures
        ));
    }
    out.push_str("# TYPE coreclaw_tool_latency_ms_max gauge\n");
    for (tool, stats) in &snapshot.tools {
        out.push_str(&format!(
            "coreclaw_tool_latency_ms_max{{tool=\"{tool}\"}} {}\n",
            stats.max_latency_ms
        ));
    }

    out.push_str("# TYPE coreclaw_scheduler_dispatches_total counter\n");
    out.push_str(&format!(
        "coreclaw_scheduler_dispatches_total {}\n",
        snapshot.scheduler.dispatches
    ));
    out.push_str("# TYPE coreclaw_scheduler_delay_ms_max gauge\n");
    out.push_str(&format!(
        "coreclaw_scheduler_delay_ms_max {}\n",
        snapshot.scheduler.max_delay_ms
    ));

    out.push_str("# TYPE coreclaw_bus_queue_depth gauge\n");
    for (direction, gauges) in [
        ("inbound", snapshot.bus_inbound),
        ("outbound", snapshot.bus_outbound),
    ] {
        for (status, value) in [
            ("pending", gauges.pending),
            ("processing", gauges.processing),
            ("dead_letter", gauges.dead_letter),
        ] {
            out.push_str(&format!(
                "coreclaw_bus_queue_depth{{direction=\"{direction}\",status=\"{status}\"}} {value}\n"
            ));
        }
    }

    out.push_str("# TYPE coreclaw_mcp_calls_total counter\n");
    for (server, stats) in &snapshot.mcp {
        out.push_str(&format!(
            "coreclaw_mcp_calls_total{{server=\"{server}\"}} {}\n",
            stats.calls
        ));
    }
    out.push_str("# TYPE coreclaw_mcp_failures_total counter\n");
    for (server, stats) in &snapshot.mcp {
        out.push_str(&format!(
            "coreclaw_mcp_failures_total{{server=\"{server}\"}} {}\n",
            stats.failures
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_stats_accumulate() {
        let metrics = Metrics::new();
        metrics.record_tool_call("fs.read", true, 10);
        metrics.record_tool_call("fs.read", false, 30);
        metrics.record_tool_call("fs.read", true, 20);

        let snapshot = metrics.snapshot(QueueGauges::default(), QueueGauges::default());
        let stats = &snapshot.tools["fs.read"];
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_latency_ms, 60);
        assert_eq!(stats.max_latency_ms, 30);
        assert!((stats.failure_rate() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn scheduler_stats_track_max_delay() {
        let metrics = Metrics::new();
        metrics.record_scheduler_dispatch(2, 100);
        metrics.record_scheduler_dispatch(1, 700);
        metrics.record_scheduler_dispatch(3, 50);

        let snapshot = metrics.snapshot(QueueGauges::default(), QueueGauges::default());
        assert_eq!(snapshot.scheduler.dispatches, 3);
        assert_eq!(snapshot.scheduler.tasks, 6);
        assert_eq!(snapshot.scheduler.max_delay_ms, 700);
    }

    #[test]
    fn mcp_stats_per_server() {
        let metrics = Metrics::new();
        metrics.record_mcp_call("github", true);
        metrics.record_mcp_call("github", false);
        metrics.record_mcp_call("jira", true);

        let snapshot = metrics.snapshot(QueueGauges::default(), QueueGauges::default());
        assert_eq!(snapshot.mcp["github"].failures, 1);
        assert_eq!(snapshot.mcp["jira"].failures, 0);
        assert!((snapshot.mcp["github"].failure_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn prometheus_rendering_contains_families() {
        let metrics = Metrics::new();
        metrics.record_tool_call("shell.exec", false, 5);
        let snapshot = metrics.snapshot(
            QueueGauges {
                pending: 2,
                processing: 1,
                dead_letter: 0,
            },
            QueueGauges::default(),
        );
        let text = render_prometheus(&snapshot);
        assert!(text.contains("coreclaw_tool_calls_total{tool=\"shell.exec\"} 1"));
        assert!(text.contains("coreclaw_tool_failures_total{tool=\"shell.exec\"} 1"));
        assert!(text.contains(
            "coreclaw_bus_queue_depth{direction=\"inbound\",status=\"pending\"} 2"
        ));
    }

    #[test]
    fn snapshot_serializes_to_json() {
        let metrics = Metrics::new();
        metrics.record_tool_call("fs.read", true, 1);
        let snapshot = metrics.snapshot(QueueGauges::default(), QueueGauges::default());
        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json["tools"]["fs.read"]["calls"].is_u64());
    }
}
