// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability: in-memory metric aggregation, SLO threshold alerts, and
//! the optional HTTP listener.

pub mod http;
pub mod metrics;
pub mod slo;

pub use http::{ObservabilityState, router, serve};
pub use metrics::{Metrics, MetricsSnapshot, QueueGauges, render_prometheus};
pub use slo::{Breach, SloWatcher, evaluate};
