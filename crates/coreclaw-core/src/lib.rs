// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types, errors, and adapter traits for the Coreclaw runtime.
//!
//! Every other crate in the workspace depends on this one; it holds the
//! shared error enum, the bus envelope, the conversation message variants,
//! and the `Channel`/`Provider`/`BusPublisher` seams.

pub mod error;
pub mod traits;
pub mod types;

pub use error::CoreclawError;
pub use traits::{BusPublisher, Channel, Provider};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, ContextMode, Direction, Envelope,
    MessageRole, RunKind, RunMode, ToolCall, ToolDefinition,
};
