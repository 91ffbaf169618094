// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Coreclaw runtime.

use thiserror::Error;

/// The primary error type used across all Coreclaw crates.
#[derive(Debug, Error)]
pub enum CoreclawError {
    /// Configuration errors (invalid JSON, missing required fields, profile violations).
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// A schema migration failed. Fatal at startup; the message carries the
    /// path of the pre-migration backup so the operator can restore.
    #[error("migration {id} failed: {message} (backup at {backup_path})")]
    Migration {
        id: String,
        message: String,
        backup_path: String,
    },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel errors (bind failure, send failure, malformed inbound payload).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// LLM provider errors (API failure, invalid response shape).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider did not respond within the configured deadline.
    #[error("provider request timed out after {ms}ms")]
    ProviderTimeout { ms: u64 },

    /// A tool invocation was denied by the policy engine. The message names
    /// the role the caller would need.
    #[error("policy denied: {0}")]
    PolicyDenied(String),

    /// Tool arguments failed schema validation.
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// A bus handler exceeded the processing deadline.
    #[error("handler timed out after {ms}ms")]
    HandlerTimeout { ms: u64 },

    /// A bus handler returned an error; drives retry/dead-letter policy.
    #[error("handler error: {0}")]
    Handler(String),

    /// A tool-supplied path resolved outside the workspace sandbox.
    #[error("outside workspace: {0}")]
    WorkspaceEscape(String),

    /// The per-tool circuit breaker is open.
    #[error("circuit open for {tool}, retry after {reopen_at}")]
    CircuitOpen { tool: String, reopen_at: String },

    /// An isolated worker failed: non-zero exit, output overflow, protocol
    /// parse failure, or kill after timeout.
    #[error("isolated worker failure: {0}")]
    IsolatedWorker(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreclawError {
    /// Wrap an arbitrary error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CoreclawError::Storage {
            source: Box::new(err),
        }
    }
}
