// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled task and task-run operations.

use coreclaw_core::CoreclawError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{TaskRecord, TaskRunRecord};

fn task_from_row(row: &rusqlite::Row<'_>) -> Result<TaskRecord, rusqlite::Error> {
    Ok(TaskRecord {
        id: row.get(0)?,
        chat_fk: row.get(1)?,
        prompt: row.get(2)?,
        schedule_type: row.get(3)?,
        schedule_value: row.get(4)?,
        context_mode: row.get(5)?,
        status: row.get(6)?,
        next_run_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const TASK_COLUMNS: &str =
    "id, chat_fk, prompt, schedule_type, schedule_value, context_mode, status, next_run_at, created_at";

/// Insert a new task. Returns the task id.
#[allow(clippy::too_many_arguments)]
pub async fn create(
    db: &Database,
    chat_fk: i64,
    prompt: &str,
    schedule_type: &str,
    schedule_value: &str,
    context_mode: &str,
    next_run_at: Option<i64>,
    now_ms: i64,
) -> Result<i64, CoreclawError> {
    let prompt = prompt.to_string();
    let schedule_type = schedule_type.to_string();
    let schedule_value = schedule_value.to_string();
    let context_mode = context_mode.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tasks
                     (chat_fk, prompt, schedule_type, schedule_value, context_mode,
                      status, next_run_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7)",
                params![
                    chat_fk,
                    prompt,
                    schedule_type,
                    schedule_value,
                    context_mode,
                    next_run_at,
                    now_ms
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Active tasks whose `next_run_at` has passed.
pub async fn list_due(db: &Database, now_ms: i64) -> Result<Vec<TaskRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE status = 'active' AND next_run_at IS NOT NULL AND next_run_at <= ?1
                 ORDER BY next_run_at ASC"
            ))?;
            let rows = stmt
                .query_map(params![now_ms], task_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Checkpoint a task before dispatch: advance `next_run_at` (and status for
/// one-shot tasks) only if the row still carries the observed schedule.
///
/// Returns false when another checkpoint won, in which case the caller must
/// not dispatch.
pub async fn checkpoint(
    db: &Database,
    task_id: i64,
    observed_next_run_at: i64,
    new_next_run_at: Option<i64>,
    new_status: &str,
) -> Result<bool, CoreclawError> {
    let new_status = new_status.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE tasks SET next_run_at = ?3, status = ?4
                 WHERE id = ?1 AND status = 'active' AND next_run_at = ?2",
                params![task_id, observed_next_run_at, new_next_run_at, new_status],
            )?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one task.
pub async fn get(db: &Database, id: i64) -> Result<Option<TaskRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let task = conn
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                    params![id],
                    task_from_row,
                )
                .optional()?;
            Ok(task)
        })
        .await
        .map_err(map_tr_err)
}

/// Tasks owned by a chat, newest first.
pub async fn list_for_chat(db: &Database, chat_fk: i64) -> Result<Vec<TaskRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE chat_fk = ?1 ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map(params![chat_fk], task_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Update a task's status (pause/resume/cancel).
pub async fn set_status(db: &Database, id: i64, status: &str) -> Result<bool, CoreclawError> {
    let status = status.to_string();
    db.connection()
        .call(move |conn| {
            let updated =
                conn.execute("UPDATE tasks SET status = ?2 WHERE id = ?1", params![id, status])?;
            Ok(updated == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Record (or update) the outcome of one task firing, keyed by the synthetic
/// envelope id so retries never create a second row.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_run(
    db: &Database,
    task_fk: i64,
    envelope_id: &str,
    status: &str,
    error: Option<&str>,
    started_at: i64,
    finished_at: Option<i64>,
) -> Result<(), CoreclawError> {
    let envelope_id = envelope_id.to_string();
    let status = status.to_string();
    let error = error.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO task_runs (task_fk, envelope_id, status, error, started_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(envelope_id) DO UPDATE
                     SET status = excluded.status, error = excluded.error,
                         finished_at = excluded.finished_at",
                params![task_fk, envelope_id, status, error, started_at, finished_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Runs for a task, newest first.
pub async fn list_runs(db: &Database, task_fk: i64) -> Result<Vec<TaskRunRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, task_fk, envelope_id, status, error, started_at, finished_at
                 FROM task_runs WHERE task_fk = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map(params![task_fk], |row| {
                    Ok(TaskRunRecord {
                        id: row.get(0)?,
                        task_fk: row.get(1)?,
                        envelope_id: row.get(2)?,
                        status: row.get(3)?,
                        error: row.get(4)?,
                        started_at: row.get(5)?,
                        finished_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
