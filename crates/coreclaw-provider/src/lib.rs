// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP chat-completion provider client.

pub mod client;
pub mod types;

pub use client::HttpProvider;
