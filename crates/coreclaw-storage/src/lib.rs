// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for Coreclaw.
//!
//! [`Storage`] is the sole writer: every durable mutation in the runtime
//! goes through the typed methods here, each of which is a single atomic
//! transaction on the writer thread.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

use std::path::{Path, PathBuf};

use coreclaw_core::CoreclawError;

pub use database::{Database, now_iso, now_ms};
pub use models::{
    AuditEventRecord, ChatRecord, ConversationStateRecord, InboundExecutionRecord,
    MessageRecord, MigrationHistoryRecord, QueueRecord, TaskRecord, TaskRunRecord,
};
pub use queries::executions::LedgerGate;
pub use queries::queue::{FailureDisposition, PublishOutcome, PublishRequest, ReplaySelector};

/// Typed access to every persisted table.
#[derive(Clone)]
pub struct Storage {
    db: Database,
}

impl Storage {
    /// Open the database, run pending migrations (with pre-apply backups),
    /// and return the storage handle.
    pub async fn open(db_path: &Path, backup_dir: &Path) -> Result<Self, CoreclawError> {
        let db = Database::open(db_path).await?;
        migrations::run_migrations(&db, db_path, backup_dir).await?;
        Ok(Self { db })
    }

    /// The underlying database handle (tests and maintenance commands).
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint and close.
    pub async fn close(&self) -> Result<(), CoreclawError> {
        self.db.close().await
    }

    // --- chats ---

    pub async fn get_or_create_chat(
        &self,
        channel: &str,
        chat_id: &str,
    ) -> Result<ChatRecord, CoreclawError> {
        queries::chats::get_or_create(&self.db, channel, chat_id).await
    }

    pub async fn get_chat(&self, id: i64) -> Result<Option<ChatRecord>, CoreclawError> {
        queries::chats::get_by_id(&self.db, id).await
    }

    pub async fn set_chat_role(&self, id: i64, role: &str) -> Result<(), CoreclawError> {
        queries::chats::set_role(&self.db, id, role).await
    }

    pub async fn set_chat_registered(&self, id: i64, registered: bool) -> Result<(), CoreclawError> {
        queries::chats::set_registered(&self.db, id, registered).await
    }

    pub async fn count_admin_chats(&self) -> Result<u64, CoreclawError> {
        queries::chats::count_admins(&self.db).await
    }

    pub async fn list_registered_chats(&self) -> Result<Vec<ChatRecord>, CoreclawError> {
        queries::chats::list_registered(&self.db).await
    }

    // --- messages ---

    pub async fn insert_message(
        &self,
        chat_fk: i64,
        role: &str,
        sender_id: Option<&str>,
        content: &str,
    ) -> Result<i64, CoreclawError> {
        queries::messages::insert(&self.db, chat_fk, role, sender_id, content).await
    }

    pub async fn recent_messages(
        &self,
        chat_fk: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, CoreclawError> {
        queries::messages::list_recent(&self.db, chat_fk, limit).await
    }

    pub async fn message_count(&self, chat_fk: i64) -> Result<u64, CoreclawError> {
        queries::messages::count(&self.db, chat_fk).await
    }

    pub async fn message_count_by_role(
        &self,
        chat_fk: i64,
        role: &str,
    ) -> Result<u64, CoreclawError> {
        queries::messages::count_by_role(&self.db, chat_fk, role).await
    }

    pub async fn prune_messages(&self, chat_fk: i64, keep: usize) -> Result<usize, CoreclawError> {
        queries::messages::prune_to_last(&self.db, chat_fk, keep).await
    }

    // --- conversation state ---

    pub async fn conversation_state(
        &self,
        chat_fk: i64,
    ) -> Result<Option<ConversationStateRecord>, CoreclawError> {
        queries::state::get(&self.db, chat_fk).await
    }

    pub async fn set_summary(&self, chat_fk: i64, summary: &str) -> Result<(), CoreclawError> {
        queries::state::set_summary(&self.db, chat_fk, summary).await
    }

    pub async fn set_enabled_skills(
        &self,
        chat_fk: i64,
        skills: &[String],
    ) -> Result<(), CoreclawError> {
        queries::state::set_enabled_skills(&self.db, chat_fk, skills).await
    }

    // --- bus queue ---

    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, CoreclawError> {
        queries::queue::publish(&self.db, request).await
    }

    pub async fn claim_batch(
        &self,
        direction: &str,
        batch_size: usize,
        now_ms: i64,
    ) -> Result<Vec<QueueRecord>, CoreclawError> {
        queries::queue::claim_batch(&self.db, direction, batch_size, now_ms).await
    }

    pub async fn mark_processed(&self, id: i64) -> Result<(), CoreclawError> {
        queries::queue::mark_processed(&self.db, id).await
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        error_text: &str,
        retry_backoff_ms: u64,
        max_retry_backoff_ms: u64,
        now_ms: i64,
    ) -> Result<FailureDisposition, CoreclawError> {
        queries::queue::mark_failed(
            &self.db,
            id,
            error_text,
            retry_backoff_ms,
            max_retry_backoff_ms,
            now_ms,
        )
        .await
    }

    pub async fn recover_stale(
        &self,
        processing_timeout_ms: u64,
        now_ms: i64,
    ) -> Result<usize, CoreclawError> {
        queries::queue::recover_stale(&self.db, processing_timeout_ms, now_ms).await
    }

    pub async fn queue_status_counts(
        &self,
        direction: &str,
    ) -> Result<(u64, u64, u64), CoreclawError> {
        queries::queue::status_counts(&self.db, direction).await
    }

    pub async fn list_dead_letter(
        &self,
        direction: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueueRecord>, CoreclawError> {
        queries::queue::list_dead_letter(&self.db, direction, limit).await
    }

    pub async fn replay_dead_letter(
        &self,
        selector: ReplaySelector,
        limit: usize,
    ) -> Result<Vec<i64>, CoreclawError> {
        queries::queue::replay_dead_letter(&self.db, selector, limit).await
    }

    pub async fn queue_record(&self, id: i64) -> Result<Option<QueueRecord>, CoreclawError> {
        queries::queue::get(&self.db, id).await
    }

    pub async fn chat_inbound_busy(
        &self,
        channel: &str,
        chat_id: &str,
    ) -> Result<bool, CoreclawError> {
        queries::queue::chat_inbound_busy(&self.db, channel, chat_id).await
    }

    // --- inbound executions ---

    pub async fn execution_gate(
        &self,
        message_id: &str,
        outbound_id: &str,
        now_ms: i64,
        stale_before: i64,
    ) -> Result<LedgerGate, CoreclawError> {
        queries::executions::gate(&self.db, message_id, outbound_id, now_ms, stale_before).await
    }

    pub async fn complete_execution(
        &self,
        message_id: &str,
        result_content: &str,
        outbound_skipped: bool,
        now_ms: i64,
    ) -> Result<(), CoreclawError> {
        queries::executions::complete(&self.db, message_id, result_content, outbound_skipped, now_ms)
            .await
    }

    pub async fn fail_execution(&self, message_id: &str, now_ms: i64) -> Result<(), CoreclawError> {
        queries::executions::fail(&self.db, message_id, now_ms).await
    }

    pub async fn execution(
        &self,
        message_id: &str,
    ) -> Result<Option<InboundExecutionRecord>, CoreclawError> {
        queries::executions::get(&self.db, message_id).await
    }

    // --- tasks ---

    #[allow(clippy::too_many_arguments)]
    pub async fn create_task(
        &self,
        chat_fk: i64,
        prompt: &str,
        schedule_type: &str,
        schedule_value: &str,
        context_mode: &str,
        next_run_at: Option<i64>,
        now_ms: i64,
    ) -> Result<i64, CoreclawError> {
        queries::tasks::create(
            &self.db,
            chat_fk,
            prompt,
            schedule_type,
            schedule_value,
            context_mode,
            next_run_at,
            now_ms,
        )
        .await
    }

    pub async fn due_tasks(&self, now_ms: i64) -> Result<Vec<TaskRecord>, CoreclawError> {
        queries::tasks::list_due(&self.db, now_ms).await
    }

    pub async fn checkpoint_task(
        &self,
        task_id: i64,
        observed_next_run_at: i64,
        new_next_run_at: Option<i64>,
        new_status: &str,
    ) -> Result<bool, CoreclawError> {
        queries::tasks::checkpoint(&self.db, task_id, observed_next_run_at, new_next_run_at, new_status)
            .await
    }

    pub async fn task(&self, id: i64) -> Result<Option<TaskRecord>, CoreclawError> {
        queries::tasks::get(&self.db, id).await
    }

    pub async fn tasks_for_chat(&self, chat_fk: i64) -> Result<Vec<TaskRecord>, CoreclawError> {
        queries::tasks::list_for_chat(&self.db, chat_fk).await
    }

    pub async fn set_task_status(&self, id: i64, status: &str) -> Result<bool, CoreclawError> {
        queries::tasks::set_status(&self.db, id, status).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_task_run(
        &self,
        task_fk: i64,
        envelope_id: &str,
        status: &str,
        error: Option<&str>,
        started_at: i64,
        finished_at: Option<i64>,
    ) -> Result<(), CoreclawError> {
        queries::tasks::upsert_run(&self.db, task_fk, envelope_id, status, error, started_at, finished_at)
            .await
    }

    pub async fn task_runs(&self, task_fk: i64) -> Result<Vec<TaskRunRecord>, CoreclawError> {
        queries::tasks::list_runs(&self.db, task_fk).await
    }

    // --- audit ---

    pub async fn insert_audit_event(
        &self,
        kind: &str,
        tool_name: Option<&str>,
        outcome: &str,
        reason: Option<&str>,
        args_json: Option<&str>,
        now_ms: i64,
    ) -> Result<i64, CoreclawError> {
        queries::audit::insert(&self.db, kind, tool_name, outcome, reason, args_json, now_ms).await
    }

    pub async fn recent_audit_events(
        &self,
        limit: usize,
    ) -> Result<Vec<AuditEventRecord>, CoreclawError> {
        queries::audit::list_recent(&self.db, limit).await
    }

    // --- meta kv ---

    pub async fn meta_get(&self, key: &str) -> Result<Option<String>, CoreclawError> {
        queries::meta::get(&self.db, key).await
    }

    pub async fn meta_set(&self, key: &str, value: &str, now_ms: i64) -> Result<(), CoreclawError> {
        queries::meta::set(&self.db, key, value, now_ms).await
    }

    pub async fn meta_delete(&self, key: &str) -> Result<(), CoreclawError> {
        queries::meta::delete(&self.db, key).await
    }

    // --- migrations ---

    pub async fn migration_history(&self) -> Result<Vec<MigrationHistoryRecord>, CoreclawError> {
        migrations::history(&self.db).await
    }
}

/// Open a throwaway storage in a temp directory (test helper).
pub async fn open_in_dir(dir: &Path) -> Result<Storage, CoreclawError> {
    let db_path: PathBuf = dir.join("coreclaw.sqlite");
    Storage::open(&db_path, &dir.join("backups")).await
}
