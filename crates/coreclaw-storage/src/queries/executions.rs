// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound-execution ledger operations.
//!
//! The ledger guarantees that a retried inbound never re-invokes the model
//! or tools after completion: the gate transaction decides exactly one of
//! "already completed", "owned elsewhere", or "start now".

use coreclaw_core::CoreclawError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::InboundExecutionRecord;

/// Outcome of the ledger gate for one inbound message id.
#[derive(Debug, Clone)]
pub enum LedgerGate {
    /// A prior run completed; the cached record is returned for re-emission.
    AlreadyCompleted(InboundExecutionRecord),
    /// Another worker owns a fresh in_progress row; do nothing.
    InFlight,
    /// This caller now owns the execution.
    Started,
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<InboundExecutionRecord, rusqlite::Error> {
    Ok(InboundExecutionRecord {
        message_id: row.get(0)?,
        status: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        result_content: row.get(4)?,
        outbound_id: row.get(5)?,
        outbound_skipped: row.get::<_, i64>(6)? != 0,
    })
}

const COLUMNS: &str =
    "message_id, status, started_at, finished_at, result_content, outbound_id, outbound_skipped";

/// Atomically consult and (if appropriate) claim the ledger row.
///
/// `stale_before` is `now - processing_timeout`: an in_progress row started
/// before it is considered abandoned and may be re-owned.
pub async fn gate(
    db: &Database,
    message_id: &str,
    outbound_id: &str,
    now_ms: i64,
    stale_before: i64,
) -> Result<LedgerGate, CoreclawError> {
    let message_id = message_id.to_string();
    let outbound_id = outbound_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing = tx
                .query_row(
                    &format!("SELECT {COLUMNS} FROM inbound_executions WHERE message_id = ?1"),
                    params![message_id],
                    record_from_row,
                )
                .optional()?;

            if let Some(record) = existing {
                if record.status == "completed" {
                    tx.commit()?;
                    return Ok(LedgerGate::AlreadyCompleted(record));
                }
                if record.status == "in_progress" && record.started_at > stale_before {
                    tx.commit()?;
                    return Ok(LedgerGate::InFlight);
                }
            }

            tx.execute(
                "INSERT INTO inbound_executions (message_id, status, started_at, outbound_id)
                 VALUES (?1, 'in_progress', ?2, ?3)
                 ON CONFLICT(message_id) DO UPDATE
                     SET status = 'in_progress', started_at = ?2, outbound_id = ?3,
                         finished_at = NULL",
                params![message_id, now_ms, outbound_id],
            )?;
            tx.commit()?;
            Ok(LedgerGate::Started)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an execution completed, caching the assistant content.
pub async fn complete(
    db: &Database,
    message_id: &str,
    result_content: &str,
    outbound_skipped: bool,
    now_ms: i64,
) -> Result<(), CoreclawError> {
    let message_id = message_id.to_string();
    let result_content = result_content.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE inbound_executions
                 SET status = 'completed', finished_at = ?2, result_content = ?3,
                     outbound_skipped = ?4
                 WHERE message_id = ?1",
                params![message_id, now_ms, result_content, outbound_skipped as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark an execution failed so a later retry can re-own it immediately.
pub async fn fail(db: &Database, message_id: &str, now_ms: i64) -> Result<(), CoreclawError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE inbound_executions
                 SET status = 'failed', finished_at = ?2
                 WHERE message_id = ?1 AND status = 'in_progress'",
                params![message_id, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one ledger row.
pub async fn get(
    db: &Database,
    message_id: &str,
) -> Result<Option<InboundExecutionRecord>, CoreclawError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| {
            let record = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM inbound_executions WHERE message_id = ?1"),
                    params![message_id],
                    record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}
