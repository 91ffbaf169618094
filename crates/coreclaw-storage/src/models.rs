// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row structs for every persisted table.

use serde::{Deserialize, Serialize};

/// A unique (channel, chat_id) pair with a role and registration flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Surrogate primary key.
    pub id: i64,
    pub channel: String,
    pub chat_id: String,
    /// "admin" or "normal".
    pub role: String,
    /// Controls full message persistence for this chat.
    pub registered: bool,
    pub created_at: String,
}

impl ChatRecord {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// A persisted conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub chat_fk: i64,
    /// "user", "assistant", "system", or "tool".
    pub role: String,
    pub sender_id: Option<String>,
    pub content: String,
    pub stored: bool,
    pub created_at: String,
}

/// Per-chat conversation state mutated by skills tools and compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStateRecord {
    pub chat_fk: i64,
    pub summary: String,
    /// Skill names, stored as a JSON array.
    pub enabled_skills: Vec<String>,
    pub last_compact_at: Option<String>,
}

/// A durable bus queue record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    pub id: i64,
    /// "inbound" or "outbound".
    pub direction: String,
    /// JSON-serialized envelope.
    pub payload: String,
    /// "pending", "processing", "processed", or "dead_letter".
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    /// Unix ms; the record is not dispatched before this time.
    pub next_attempt_at: i64,
    pub claimed_at: Option<i64>,
    pub last_error: Option<String>,
    pub dead_lettered_at: Option<i64>,
    pub created_at: i64,
    pub channel: String,
    pub chat_id: String,
}

/// The inbound-execution ledger row protecting against duplicate side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundExecutionRecord {
    pub message_id: String,
    /// "in_progress", "completed", or "failed".
    pub status: String,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub result_content: Option<String>,
    pub outbound_id: Option<String>,
    pub outbound_skipped: bool,
}

/// A scheduled task owned by a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub chat_fk: i64,
    pub prompt: String,
    /// "cron", "interval", or "once".
    pub schedule_type: String,
    pub schedule_value: String,
    /// "group" or "isolated".
    pub context_mode: String,
    /// "active", "paused", or "done".
    pub status: String,
    /// Unix ms; None once a one-shot task is done.
    pub next_run_at: Option<i64>,
    pub created_at: i64,
}

/// Outcome of one task firing, keyed by the synthetic envelope id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunRecord {
    pub id: i64,
    pub task_fk: i64,
    pub envelope_id: String,
    /// "success" or "failure".
    pub status: String,
    pub error: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEventRecord {
    pub id: i64,
    pub kind: String,
    pub tool_name: Option<String>,
    /// "ok", "denied", or "error".
    pub outcome: String,
    pub reason: Option<String>,
    /// Tool arguments with sensitive keys redacted.
    pub args_json: Option<String>,
    pub created_at: i64,
}

/// One applied (or failed) migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationHistoryRecord {
    pub id: String,
    pub status: String,
    pub backup_path: String,
    pub applied_at: String,
}
