// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook channel: HTTP ingress for inbound messages and a polled outbox
//! for outbound replies.

pub mod outbox;
pub mod server;

pub use outbox::{Outbox, OutboxEntry};
pub use server::{CHANNEL_NAME, WebhookChannel, WebhookState, router, serve};
