// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool registry, policy engine, audit trail, and the builtin tool set.

pub mod bootstrap;
pub mod builtin;
pub mod policy;
pub mod registry;

pub use builtin::register_builtin_tools;
pub use registry::{Tool, ToolContext, ToolRegistry, parse_args};
