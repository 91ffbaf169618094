// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat table operations. Chats are created on first reference and never
//! deleted.

use coreclaw_core::CoreclawError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, now_iso};
use crate::models::ChatRecord;

fn chat_from_row(row: &rusqlite::Row<'_>) -> Result<ChatRecord, rusqlite::Error> {
    Ok(ChatRecord {
        id: row.get(0)?,
        channel: row.get(1)?,
        chat_id: row.get(2)?,
        role: row.get(3)?,
        registered: row.get::<_, i64>(4)? != 0,
        created_at: row.get(5)?,
    })
}

const COLUMNS: &str = "id, channel, chat_id, role, registered, created_at";

/// Look up a chat by (channel, chat_id), inserting it on first reference.
pub async fn get_or_create(
    db: &Database,
    channel: &str,
    chat_id: &str,
) -> Result<ChatRecord, CoreclawError> {
    let channel = channel.to_string();
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chats (channel, chat_id, created_at) VALUES (?1, ?2, ?3)",
                params![channel, chat_id, now_iso()],
            )?;
            let chat = conn.query_row(
                &format!("SELECT {COLUMNS} FROM chats WHERE channel = ?1 AND chat_id = ?2"),
                params![channel, chat_id],
                chat_from_row,
            )?;
            Ok(chat)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a chat by surrogate id.
pub async fn get_by_id(db: &Database, id: i64) -> Result<Option<ChatRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let chat = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM chats WHERE id = ?1"),
                    params![id],
                    chat_from_row,
                )
                .optional()?;
            Ok(chat)
        })
        .await
        .map_err(map_tr_err)
}

/// Update a chat's role.
pub async fn set_role(db: &Database, id: i64, role: &str) -> Result<(), CoreclawError> {
    let role = role.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("UPDATE chats SET role = ?2 WHERE id = ?1", params![id, role])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Update a chat's registration flag.
pub async fn set_registered(db: &Database, id: i64, registered: bool) -> Result<(), CoreclawError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chats SET registered = ?2 WHERE id = ?1",
                params![id, registered as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of chats with the admin role.
pub async fn count_admins(db: &Database) -> Result<u64, CoreclawError> {
    db.connection()
        .call(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chats WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// All registered chats (used by the heartbeat source).
pub async fn list_registered(db: &Database) -> Result<Vec<ChatRecord>, CoreclawError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM chats WHERE registered = 1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map([], chat_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
