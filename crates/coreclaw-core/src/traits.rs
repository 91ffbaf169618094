// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter traits at the seams of the runtime.
//!
//! Channels feed the bus and deliver its outbound records; the provider is
//! the external language-model collaborator. Both are object-safe so the
//! runtime can hold them behind `Arc<dyn ...>`.

use async_trait::async_trait;

use crate::error::CoreclawError;
use crate::types::{ChatRequest, ChatResponse, Envelope};

/// A message transport bound to a name (cli, webhook, ...).
///
/// Inbound flows through `Bus::publish_inbound` (channels hold a publisher
/// handle); outbound is delivered back through [`Channel::send`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// The channel name used in `Envelope::channel`.
    fn name(&self) -> &str;

    /// Deliver one outbound envelope to the transport.
    async fn send(&self, envelope: &Envelope) -> Result<(), CoreclawError>;
}

/// Language-model provider contract.
///
/// The default implementation is an HTTP client; tests substitute scripted
/// providers.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, CoreclawError>;
}

/// The bus surface exposed to tools and synthetic-inbound sources.
///
/// Tools must not hold the router; they re-enter the pipeline only through
/// these publish methods.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Idempotently enqueue an inbound envelope. Returns the queue id, or
    /// `None` when the envelope was a duplicate.
    async fn publish_inbound(&self, envelope: Envelope) -> Result<Option<i64>, CoreclawError>;

    /// Idempotently enqueue an outbound envelope. Returns the queue id, or
    /// `None` when the envelope was a duplicate.
    async fn publish_outbound(&self, envelope: Envelope) -> Result<Option<i64>, CoreclawError>;
}
