// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Free-form key/value state: bootstrap lockout, heartbeat dedupe window,
//! scheduler checkpoints.

use coreclaw_core::CoreclawError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// Fetch a value.
pub async fn get(db: &Database, key: &str) -> Result<Option<String>, CoreclawError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM meta_kv WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a value.
pub async fn set(db: &Database, key: &str, value: &str, now_ms: i64) -> Result<(), CoreclawError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO meta_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE
                     SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_ms],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a key. Missing keys are fine.
pub async fn delete(db: &Database, key: &str) -> Result<(), CoreclawError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM meta_kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
