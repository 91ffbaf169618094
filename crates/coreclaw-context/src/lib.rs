// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly under a token budget.

pub mod builder;
pub mod tokens;

pub use builder::{ContextBuilder, Skill};
pub use tokens::{TRUNCATION_SUFFIX, conversation_tokens, fit_to_budget, input_budget, text_tokens};
