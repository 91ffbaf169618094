// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook channel HTTP server.
//!
//! `POST <path>` accepts an inbound message for the bus; `GET
//! <path>/outbound` drains the in-memory outbox for one chat. Auth is a
//! bearer token (or the `x-coreclaw-token` header); bodies are size-capped.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use coreclaw_config::WebhookConfig;
use coreclaw_core::{BusPublisher, Channel, CoreclawError, Envelope};
use coreclaw_storage::{now_iso, now_ms};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use crate::outbox::{Outbox, OutboxEntry};

/// Channel name used in envelopes.
pub const CHANNEL_NAME: &str = "webhook";

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhookState {
    pub publisher: Arc<dyn BusPublisher>,
    pub outbox: Arc<Outbox>,
    pub auth_token: Option<String>,
}

/// The webhook as a bus channel: outbound replies land in the outbox.
pub struct WebhookChannel {
    outbox: Arc<Outbox>,
}

impl WebhookChannel {
    pub fn new(outbox: Arc<Outbox>) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
        self.outbox.push(
            &envelope.chat_id,
            OutboxEntry {
                id: envelope.id.clone(),
                content: envelope.content.clone(),
                created_at: envelope.created_at.clone(),
            },
            now_ms(),
        );
        debug!(chat_id = %envelope.chat_id, "reply queued in outbox");
        Ok(())
    }
}

/// Inbound POST body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InboundBody {
    chat_id: String,
    content: String,
    #[serde(default)]
    sender_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OutboundQuery {
    chat_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

/// Build the webhook router for the configured path.
pub fn router(config: &WebhookConfig, state: WebhookState) -> Router {
    let path = config.path.trim_end_matches('/').to_string();
    let outbound_path = format!("{path}/outbound");
    Router::new()
        .route(&path, post(post_inbound))
        .route(&outbound_path, get(get_outbound))
        .fallback(|| async { (StatusCode::NOT_FOUND, "not found") })
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until aborted.
pub async fn serve(config: &WebhookConfig, state: WebhookState) -> Result<(), CoreclawError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreclawError::Channel {
            message: format!("failed to bind webhook to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;
    info!("webhook channel listening on {addr}");
    axum::serve(listener, router(config, state))
        .await
        .map_err(|e| CoreclawError::Channel {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })
}

fn check_auth(state: &WebhookState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.auth_token else {
        return Ok(());
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-coreclaw-token").and_then(|v| v.to_str().ok()));

    match presented {
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"ok": false, "error": "missing auth token"})),
        )
            .into_response()),
        Some(token) if token != expected => Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"ok": false, "error": "invalid auth token"})),
        )
            .into_response()),
        Some(_) => Ok(()),
    }
}

async fn post_inbound(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let body: InboundBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"ok": false, "error": format!("invalid body: {err}")})),
            )
                .into_response();
        }
    };
    if body.chat_id.is_empty() || body.content.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"ok": false, "error": "chat_id and content are required"})),
        )
            .into_response();
    }

    let id = body
        .id
        .unwrap_or_else(|| format!("webhook:{}", uuid::Uuid::new_v4()));
    let envelope = Envelope {
        id: id.clone(),
        channel: CHANNEL_NAME.to_string(),
        chat_id: body.chat_id,
        sender_id: body.sender_id,
        content: body.content,
        created_at: body.created_at.unwrap_or_else(now_iso),
        metadata: body.metadata,
    };

    match state.publisher.publish_inbound(envelope).await {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"ok": true, "id": id})),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"ok": false, "error": err.to_string()})),
        )
            .into_response(),
    }
}

async fn get_outbound(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Query(query): Query<OutboundQuery>,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let entries = state.outbox.drain(&query.chat_id, limit, now_ms());
    (
        StatusCode::OK,
        Json(serde_json::json!({"ok": true, "messages": entries})),
    )
        .into_response()
}
