// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered schema migrations with pre-apply backups.
//!
//! Before each migration applies, the database file is copied into the
//! backup directory via rusqlite's Backup API and the path is recorded in
//! `migration_history`. Only then does the migration SQL run, inside a
//! transaction. A failure aborts startup with the backup path in the error.

use std::path::Path;
use std::time::Duration;

use coreclaw_core::CoreclawError;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::database::{Database, map_tr_err, now_iso};

struct Migration {
    id: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_chats_messages",
        sql: "CREATE TABLE chats (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  channel TEXT NOT NULL,
                  chat_id TEXT NOT NULL,
                  role TEXT NOT NULL DEFAULT 'normal',
                  registered INTEGER NOT NULL DEFAULT 0,
                  created_at TEXT NOT NULL,
                  UNIQUE (channel, chat_id)
              );
              CREATE TABLE messages (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  chat_fk INTEGER NOT NULL REFERENCES chats(id),
                  role TEXT NOT NULL,
                  sender_id TEXT,
                  content TEXT NOT NULL,
                  stored INTEGER NOT NULL DEFAULT 1,
                  created_at TEXT NOT NULL
              );
              CREATE INDEX idx_messages_chat ON messages(chat_fk, id);
              CREATE TABLE conversation_state (
                  chat_fk INTEGER PRIMARY KEY REFERENCES chats(id),
                  summary TEXT NOT NULL DEFAULT '',
                  enabled_skills TEXT NOT NULL DEFAULT '[]',
                  last_compact_at TEXT
              );",
    },
    Migration {
        id: "0002_bus_queue",
        sql: "CREATE TABLE bus_queue (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  direction TEXT NOT NULL,
                  payload TEXT NOT NULL,
                  status TEXT NOT NULL DEFAULT 'pending',
                  attempts INTEGER NOT NULL DEFAULT 0,
                  max_attempts INTEGER NOT NULL DEFAULT 3,
                  next_attempt_at INTEGER NOT NULL DEFAULT 0,
                  claimed_at INTEGER,
                  last_error TEXT,
                  dead_lettered_at INTEGER,
                  created_at INTEGER NOT NULL,
                  channel TEXT NOT NULL,
                  chat_id TEXT NOT NULL
              );
              CREATE INDEX idx_bus_queue_dispatch
                  ON bus_queue(direction, status, next_attempt_at);
              CREATE INDEX idx_bus_queue_chat
                  ON bus_queue(direction, channel, chat_id, created_at);
              CREATE TABLE message_dedupe (
                  direction TEXT NOT NULL,
                  message_id TEXT NOT NULL,
                  queue_id INTEGER NOT NULL,
                  created_at INTEGER NOT NULL,
                  PRIMARY KEY (direction, message_id)
              );",
    },
    Migration {
        id: "0003_inbound_executions",
        sql: "CREATE TABLE inbound_executions (
                  message_id TEXT PRIMARY KEY,
                  status TEXT NOT NULL,
                  started_at INTEGER NOT NULL,
                  finished_at INTEGER,
                  result_content TEXT,
                  outbound_id TEXT,
                  outbound_skipped INTEGER NOT NULL DEFAULT 0
              );",
    },
    Migration {
        id: "0004_tasks",
        sql: "CREATE TABLE tasks (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  chat_fk INTEGER NOT NULL REFERENCES chats(id),
                  prompt TEXT NOT NULL,
                  schedule_type TEXT NOT NULL,
                  schedule_value TEXT NOT NULL,
                  context_mode TEXT NOT NULL DEFAULT 'group',
                  status TEXT NOT NULL DEFAULT 'active',
                  next_run_at INTEGER,
                  created_at INTEGER NOT NULL
              );
              CREATE INDEX idx_tasks_due ON tasks(status, next_run_at);
              CREATE TABLE task_runs (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  task_fk INTEGER NOT NULL REFERENCES tasks(id),
                  envelope_id TEXT NOT NULL UNIQUE,
                  status TEXT NOT NULL,
                  error TEXT,
                  started_at INTEGER NOT NULL,
                  finished_at INTEGER
              );",
    },
    Migration {
        id: "0005_audit_meta",
        sql: "CREATE TABLE audit_events (
                  id INTEGER PRIMARY KEY AUTOINCREMENT,
                  kind TEXT NOT NULL,
                  tool_name TEXT,
                  outcome TEXT NOT NULL,
                  reason TEXT,
                  args_json TEXT,
                  created_at INTEGER NOT NULL
              );
              CREATE TABLE meta_kv (
                  key TEXT PRIMARY KEY,
                  value TEXT NOT NULL,
                  updated_at INTEGER NOT NULL
              );",
    },
];

/// Run all pending migrations, backing up the database file before each.
pub async fn run_migrations(
    db: &Database,
    db_path: &Path,
    backup_dir: &Path,
) -> Result<(), CoreclawError> {
    db.connection()
        .call(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS migration_history (
                     id TEXT PRIMARY KEY,
                     status TEXT NOT NULL,
                     backup_path TEXT NOT NULL,
                     applied_at TEXT NOT NULL
                 );",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

    for migration in MIGRATIONS {
        let id = migration.id.to_string();
        let applied: bool = db
            .connection()
            .call({
                let id = id.clone();
                move |conn| {
                    let count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM migration_history WHERE id = ?1 AND status = 'applied'",
                        [&id],
                        |row| row.get(0),
                    )?;
                    Ok(count > 0)
                }
            })
            .await
            .map_err(map_tr_err)?;
        if applied {
            continue;
        }

        let backup_path = backup_file(db_path, backup_dir, migration.id)?;
        let backup_display = backup_path.display().to_string();

        let result = db
            .connection()
            .call({
                let id = id.clone();
                let backup = backup_display.clone();
                let sql = migration.sql;
                move |conn| {
                    conn.execute(
                        "INSERT OR REPLACE INTO migration_history (id, status, backup_path, applied_at)
                         VALUES (?1, 'pending', ?2, ?3)",
                        rusqlite::params![id, backup, now_iso()],
                    )?;
                    let tx = conn.transaction()?;
                    tx.execute_batch(sql)?;
                    tx.commit()?;
                    conn.execute(
                        "UPDATE migration_history SET status = 'applied', applied_at = ?2 WHERE id = ?1",
                        rusqlite::params![id, now_iso()],
                    )?;
                    Ok(())
                }
            })
            .await;

        match result {
            Ok(()) => {
                info!(migration = migration.id, backup = %backup_display, "migration applied");
            }
            Err(err) => {
                warn!(migration = migration.id, error = %err, "migration failed");
                let _ = db
                    .connection()
                    .call({
                        let id = id.clone();
                        move |conn| {
                            conn.execute(
                                "UPDATE migration_history SET status = 'failed' WHERE id = ?1",
                                [&id],
                            )?;
                            Ok(())
                        }
                    })
                    .await;
                return Err(CoreclawError::Migration {
                    id,
                    message: err.to_string(),
                    backup_path: backup_display,
                });
            }
        }
    }
    Ok(())
}

/// Copy the database file into the backup directory using the Backup API,
/// which stays consistent even mid-write in WAL mode.
fn backup_file(
    db_path: &Path,
    backup_dir: &Path,
    migration_id: &str,
) -> Result<std::path::PathBuf, CoreclawError> {
    std::fs::create_dir_all(backup_dir).map_err(CoreclawError::storage)?;

    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let backup_path = backup_dir.join(format!("{migration_id}-{stamp}.sqlite"));

    let src = Connection::open_with_flags(
        db_path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(CoreclawError::storage)?;
    let mut dst = Connection::open(&backup_path).map_err(CoreclawError::storage)?;

    let backup = rusqlite::backup::Backup::new(&src, &mut dst).map_err(CoreclawError::storage)?;
    backup
        .run_to_completion(100, Duration::from_millis(10), None)
        .map_err(CoreclawError::storage)?;

    Ok(backup_path)
}

/// List migration history rows, oldest first.
pub async fn history(db: &Database) -> Result<Vec<crate::models::MigrationHistoryRecord>, CoreclawError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status, backup_path, applied_at FROM migration_history ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(crate::models::MigrationHistoryRecord {
                        id: row.get(0)?,
                        status: row.get(1)?,
                        backup_path: row.get(2)?,
                        applied_at: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
