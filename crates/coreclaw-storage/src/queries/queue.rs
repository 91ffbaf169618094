// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bus queue operations.
//!
//! Every mutation here is a single transaction on the writer thread, so
//! publish (dedupe + overflow + rate limit + enqueue), claim, and the
//! status transitions are atomic.

use coreclaw_core::CoreclawError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::QueueRecord;

/// Result of an idempotent publish.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishOutcome {
    /// Enqueued as pending under the returned queue id.
    Enqueued(i64),
    /// The (direction, message_id) pair was already published; no-op.
    Duplicate,
    /// Recorded directly as dead_letter (overflow or rate limit).
    DeadLettered { queue_id: i64, reason: String },
}

/// Everything the publish transaction needs to decide the record's fate.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub direction: String,
    pub message_id: String,
    pub payload: String,
    pub channel: String,
    pub chat_id: String,
    pub max_attempts: u32,
    pub max_pending: usize,
    /// 0 disables the per-chat rate limit.
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: usize,
    pub now_ms: i64,
}

/// Transactionally publish one envelope.
pub async fn publish(db: &Database, req: PublishRequest) -> Result<PublishOutcome, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let duplicate: bool = {
                let mut stmt = tx.prepare(
                    "SELECT 1 FROM message_dedupe WHERE direction = ?1 AND message_id = ?2",
                )?;
                stmt.exists(params![req.direction, req.message_id])?
            };
            if duplicate {
                tx.commit()?;
                return Ok(PublishOutcome::Duplicate);
            }

            let pending: i64 = tx.query_row(
                "SELECT COUNT(*) FROM bus_queue WHERE direction = ?1 AND status = 'pending'",
                params![req.direction],
                |row| row.get(0),
            )?;

            let mut dead_letter_reason: Option<&str> = None;
            if pending as usize >= req.max_pending {
                dead_letter_reason = Some("Queue overflow");
            } else if req.direction == "inbound" && req.rate_limit_max > 0 {
                let window_start = req.now_ms - req.rate_limit_window_ms as i64;
                let recent: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM bus_queue
                     WHERE direction = ?1 AND channel = ?2 AND chat_id = ?3
                       AND created_at >= ?4",
                    params![req.direction, req.channel, req.chat_id, window_start],
                    |row| row.get(0),
                )?;
                if recent as usize >= req.rate_limit_max {
                    dead_letter_reason = Some("Rate limit exceeded");
                }
            }

            let queue_id = match dead_letter_reason {
                Some(reason) => {
                    tx.execute(
                        "INSERT INTO bus_queue
                             (direction, payload, status, attempts, max_attempts,
                              next_attempt_at, last_error, dead_lettered_at, created_at,
                              channel, chat_id)
                         VALUES (?1, ?2, 'dead_letter', 0, ?3, 0, ?4, ?5, ?5, ?6, ?7)",
                        params![
                            req.direction,
                            req.payload,
                            req.max_attempts,
                            reason,
                            req.now_ms,
                            req.channel,
                            req.chat_id
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
                None => {
                    tx.execute(
                        "INSERT INTO bus_queue
                             (direction, payload, status, attempts, max_attempts,
                              next_attempt_at, created_at, channel, chat_id)
                         VALUES (?1, ?2, 'pending', 0, ?3, 0, ?4, ?5, ?6)",
                        params![
                            req.direction,
                            req.payload,
                            req.max_attempts,
                            req.now_ms,
                            req.channel,
                            req.chat_id
                        ],
                    )?;
                    tx.last_insert_rowid()
                }
            };

            tx.execute(
                "INSERT INTO message_dedupe (direction, message_id, queue_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![req.direction, req.message_id, queue_id, req.now_ms],
            )?;
            tx.commit()?;

            match dead_letter_reason {
                Some(reason) => Ok(PublishOutcome::DeadLettered {
                    queue_id,
                    reason: reason.to_string(),
                }),
                None => Ok(PublishOutcome::Enqueued(queue_id)),
            }
        })
        .await
        .map_err(map_tr_err)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> Result<QueueRecord, rusqlite::Error> {
    Ok(QueueRecord {
        id: row.get(0)?,
        direction: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        attempts: row.get(4)?,
        max_attempts: row.get(5)?,
        next_attempt_at: row.get(6)?,
        claimed_at: row.get(7)?,
        last_error: row.get(8)?,
        dead_lettered_at: row.get(9)?,
        created_at: row.get(10)?,
        channel: row.get(11)?,
        chat_id: row.get(12)?,
    })
}

const RECORD_COLUMNS: &str = "id, direction, payload, status, attempts, max_attempts,
     next_attempt_at, claimed_at, last_error, dead_lettered_at, created_at, channel, chat_id";

/// Claim up to `batch_size` due pending records, transitioning each
/// pending -> processing. Records come back in `created_at` order.
pub async fn claim_batch(
    db: &Database,
    direction: &str,
    batch_size: usize,
    now_ms: i64,
) -> Result<Vec<QueueRecord>, CoreclawError> {
    let direction = direction.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidates: Vec<QueueRecord> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {RECORD_COLUMNS} FROM bus_queue
                     WHERE direction = ?1 AND status = 'pending' AND next_attempt_at <= ?2
                     ORDER BY created_at ASC, id ASC
                     LIMIT ?3"
                ))?;
                stmt.query_map(
                    params![direction, now_ms, batch_size as i64],
                    record_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?
            };

            let mut claimed = Vec::with_capacity(candidates.len());
            for mut record in candidates {
                // Conditional claim: only the winner proceeds.
                let updated = tx.execute(
                    "UPDATE bus_queue SET status = 'processing', claimed_at = ?2
                     WHERE id = ?1 AND status = 'pending'",
                    params![record.id, now_ms],
                )?;
                if updated == 1 {
                    record.status = "processing".to_string();
                    record.claimed_at = Some(now_ms);
                    claimed.push(record);
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Transition a processing record to processed.
pub async fn mark_processed(db: &Database, id: i64) -> Result<(), CoreclawError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE bus_queue SET status = 'processed', claimed_at = NULL WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Final status after a handler failure.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureDisposition {
    /// Back to pending; dispatch not before the contained unix ms.
    Retrying { next_attempt_at: i64 },
    DeadLettered,
}

/// Record a handler failure: retry with exponential backoff or dead-letter
/// once attempts are exhausted.
pub async fn mark_failed(
    db: &Database,
    id: i64,
    error_text: &str,
    retry_backoff_ms: u64,
    max_retry_backoff_ms: u64,
    now_ms: i64,
) -> Result<FailureDisposition, CoreclawError> {
    let error_text = error_text.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (attempts, max_attempts): (u32, u32) = tx.query_row(
                "SELECT attempts, max_attempts FROM bus_queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let disposition = if attempts + 1 < max_attempts {
                let backoff = max_retry_backoff_ms
                    .min(retry_backoff_ms.saturating_mul(1u64 << attempts.min(32)));
                let next_attempt_at = now_ms + backoff as i64;
                tx.execute(
                    "UPDATE bus_queue
                     SET status = 'pending', attempts = ?2, next_attempt_at = ?3,
                         claimed_at = NULL, last_error = ?4
                     WHERE id = ?1",
                    params![id, attempts + 1, next_attempt_at, error_text],
                )?;
                FailureDisposition::Retrying { next_attempt_at }
            } else {
                tx.execute(
                    "UPDATE bus_queue
                     SET status = 'dead_letter', attempts = ?2, claimed_at = NULL,
                         last_error = ?3, dead_lettered_at = ?4
                     WHERE id = ?1",
                    params![id, attempts + 1, error_text, now_ms],
                )?;
                FailureDisposition::DeadLettered
            };
            tx.commit()?;
            Ok(disposition)
        })
        .await
        .map_err(map_tr_err)
}

/// Return stale processing records (claimed before the horizon) to pending,
/// preserving their attempt counts. Returns how many were recovered.
pub async fn recover_stale(
    db: &Database,
    processing_timeout_ms: u64,
    now_ms: i64,
) -> Result<usize, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let horizon = now_ms - processing_timeout_ms as i64;
            let recovered = conn.execute(
                "UPDATE bus_queue SET status = 'pending', claimed_at = NULL
                 WHERE status = 'processing' AND claimed_at < ?1",
                params![horizon],
            )?;
            Ok(recovered)
        })
        .await
        .map_err(map_tr_err)
}

/// Pending/processing/dead_letter counts for one direction.
pub async fn status_counts(
    db: &Database,
    direction: &str,
) -> Result<(u64, u64, u64), CoreclawError> {
    let direction = direction.to_string();
    db.connection()
        .call(move |conn| {
            let count = |status: &str| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM bus_queue WHERE direction = ?1 AND status = ?2",
                    params![direction, status],
                    |row| row.get(0),
                )
            };
            Ok((
                count("pending")? as u64,
                count("processing")? as u64,
                count("dead_letter")? as u64,
            ))
        })
        .await
        .map_err(map_tr_err)
}

/// List dead-letter records, newest first.
pub async fn list_dead_letter(
    db: &Database,
    direction: Option<&str>,
    limit: usize,
) -> Result<Vec<QueueRecord>, CoreclawError> {
    let direction = direction.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let rows = match direction {
                Some(direction) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM bus_queue
                         WHERE status = 'dead_letter' AND direction = ?1
                         ORDER BY dead_lettered_at DESC LIMIT ?2"
                    ))?;
                    stmt.query_map(params![direction, limit as i64], record_from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {RECORD_COLUMNS} FROM bus_queue
                         WHERE status = 'dead_letter'
                         ORDER BY dead_lettered_at DESC LIMIT ?1"
                    ))?;
                    stmt.query_map(params![limit as i64], record_from_row)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Which dead-letter records a replay targets.
#[derive(Debug, Clone)]
pub enum ReplaySelector {
    ById(i64),
    ByDirection(String),
    All,
}

/// Move the selected dead-letter records back to pending with fresh attempts.
/// Returns the replayed queue ids.
pub async fn replay_dead_letter(
    db: &Database,
    selector: ReplaySelector,
    limit: usize,
) -> Result<Vec<i64>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let ids: Vec<i64> = {
                let (sql, param): (String, Option<String>) = match &selector {
                    ReplaySelector::ById(id) => (
                        "SELECT id FROM bus_queue WHERE status = 'dead_letter' AND id = ?1 LIMIT ?2"
                            .to_string(),
                        Some(id.to_string()),
                    ),
                    ReplaySelector::ByDirection(direction) => (
                        "SELECT id FROM bus_queue
                         WHERE status = 'dead_letter' AND direction = ?1
                         ORDER BY dead_lettered_at ASC LIMIT ?2"
                            .to_string(),
                        Some(direction.clone()),
                    ),
                    ReplaySelector::All => (
                        "SELECT id FROM bus_queue WHERE status = 'dead_letter'
                         ORDER BY dead_lettered_at ASC LIMIT ?1"
                            .to_string(),
                        None,
                    ),
                };
                let mut stmt = tx.prepare(&sql)?;
                match param {
                    Some(p) => stmt
                        .query_map(params![p, limit as i64], |row| row.get(0))?
                        .collect::<Result<Vec<i64>, _>>()?,
                    None => stmt
                        .query_map(params![limit as i64], |row| row.get(0))?
                        .collect::<Result<Vec<i64>, _>>()?,
                }
            };

            for id in &ids {
                tx.execute(
                    "UPDATE bus_queue
                     SET status = 'pending', attempts = 0, next_attempt_at = 0,
                         claimed_at = NULL, last_error = NULL, dead_lettered_at = NULL
                     WHERE id = ?1",
                    params![id],
                )?;
            }
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one record by queue id.
pub async fn get(db: &Database, id: i64) -> Result<Option<QueueRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM bus_queue WHERE id = ?1"
            ))?;
            let mut rows = stmt
                .query_map(params![id], record_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows.pop())
        })
        .await
        .map_err(map_tr_err)
}

/// True when the chat has any inbound record in {pending, processing}.
pub async fn chat_inbound_busy(
    db: &Database,
    channel: &str,
    chat_id: &str,
) -> Result<bool, CoreclawError> {
    let channel = channel.to_string();
    let chat_id = chat_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT 1 FROM bus_queue
                 WHERE direction = 'inbound' AND channel = ?1 AND chat_id = ?2
                   AND status IN ('pending', 'processing')
                 LIMIT 1",
            )?;
            Ok(stmt.exists(params![channel, chat_id])?)
        })
        .await
        .map_err(map_tr_err)
}
