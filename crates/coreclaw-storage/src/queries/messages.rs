// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message table operations. Rows are immutable once inserted; pruning
//! removes the oldest rows beyond the history cap during compaction.

use coreclaw_core::CoreclawError;
use rusqlite::params;

use crate::database::{Database, map_tr_err, now_iso};
use crate::models::MessageRecord;

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<MessageRecord, rusqlite::Error> {
    Ok(MessageRecord {
        id: row.get(0)?,
        chat_fk: row.get(1)?,
        role: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        stored: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
    })
}

const COLUMNS: &str = "id, chat_fk, role, sender_id, content, stored, created_at";

/// Insert one message. Returns the row id.
pub async fn insert(
    db: &Database,
    chat_fk: i64,
    role: &str,
    sender_id: Option<&str>,
    content: &str,
) -> Result<i64, CoreclawError> {
    let role = role.to_string();
    let sender_id = sender_id.map(str::to_string);
    let content = content.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (chat_fk, role, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![chat_fk, role, sender_id, content, now_iso()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// The last `limit` messages for a chat, oldest first.
pub async fn list_recent(
    db: &Database,
    chat_fk: i64,
    limit: usize,
) -> Result<Vec<MessageRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM (
                     SELECT {COLUMNS} FROM messages WHERE chat_fk = ?1
                     ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC"
            ))?;
            let rows = stmt
                .query_map(params![chat_fk, limit as i64], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of stored messages for a chat.
pub async fn count(db: &Database, chat_fk: i64) -> Result<u64, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_fk = ?1",
                params![chat_fk],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete all but the newest `keep` messages for a chat. Returns how many
/// rows were pruned.
pub async fn prune_to_last(db: &Database, chat_fk: i64, keep: usize) -> Result<usize, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let pruned = conn.execute(
                "DELETE FROM messages WHERE chat_fk = ?1 AND id NOT IN (
                     SELECT id FROM messages WHERE chat_fk = ?1
                     ORDER BY id DESC LIMIT ?2
                 )",
                params![chat_fk, keep as i64],
            )?;
            Ok(pruned)
        })
        .await
        .map_err(map_tr_err)
}

/// Count messages with the given role for a chat (test and invariant support).
pub async fn count_by_role(
    db: &Database,
    chat_fk: i64,
    role: &str,
) -> Result<u64, CoreclawError> {
    let role = role.to_string();
    db.connection()
        .call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_fk = ?1 AND role = ?2",
                params![chat_fk, role],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}
