// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Security primitives for the Coreclaw runtime: secret redaction, the
//! outbound URL policy, workspace path containment, and shell tokenization.

pub mod redact;
pub mod shellwords;
pub mod urlpolicy;
pub mod workspace;

pub use redact::{REDACTED, redact_json, redact_text};
pub use shellwords::tokenize;
pub use urlpolicy::{UrlPolicy, check_url, is_private_ip};
pub use workspace::{chat_memory_rel_path, resolve_in_workspace, sanitize_chat_id};
