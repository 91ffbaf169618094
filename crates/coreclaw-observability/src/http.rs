// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observability HTTP listener: health probes, Prometheus text metrics,
//! and the JSON status aggregate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, extract::State};
use coreclaw_core::CoreclawError;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::metrics::render_prometheus;
use crate::slo::SloWatcher;

/// Shared state for the listener handlers.
#[derive(Clone)]
pub struct ObservabilityState {
    pub watcher: Arc<SloWatcher>,
    /// Flips true once the app finished wiring and the bus is dispatching.
    pub ready: Arc<AtomicBool>,
}

/// Build the router (exposed for tests).
pub fn router(state: ObservabilityState) -> Router {
    Router::new()
        .route("/health/live", get(get_live))
        .route("/health/ready", get(get_ready))
        .route("/health/startup", get(get_startup))
        .route("/metrics", get(get_metrics))
        .route("/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the task is aborted.
pub async fn serve(
    host: &str,
    port: u16,
    state: ObservabilityState,
) -> Result<(), CoreclawError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreclawError::Channel {
            message: format!("failed to bind observability listener to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;
    info!("observability listener on {addr}");
    axum::serve(listener, router(state))
        .await
        .map_err(|e| CoreclawError::Channel {
            message: format!("observability listener error: {e}"),
            source: Some(Box::new(e)),
        })
}

async fn get_live() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn get_ready(State(state): State<ObservabilityState>) -> impl IntoResponse {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

async fn get_startup(State(state): State<ObservabilityState>) -> impl IntoResponse {
    get_ready(State(state)).await
}

async fn get_metrics(State(state): State<ObservabilityState>) -> impl IntoResponse {
    match state.watcher.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, render_prometheus(&snapshot)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn get_status(State(state): State<ObservabilityState>) -> impl IntoResponse {
    match state.watcher.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
