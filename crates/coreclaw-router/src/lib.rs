// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation routing: one inbound turn, orchestrated against the
//! inbound-execution ledger, plus the outbound channel multiplexer and
//! history compaction.

pub mod channels;
pub mod compaction;
pub mod router;

pub use channels::ChannelMux;
pub use compaction::compact_chat;
pub use router::ConversationRouter;
