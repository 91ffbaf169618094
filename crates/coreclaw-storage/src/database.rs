// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::Path;

use coreclaw_core::CoreclawError;
use tokio_rusqlite::Connection;
use tracing::debug;

/// Handle to the single SQLite connection backing the runtime.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path` and apply connection PRAGMAs.
    pub async fn open(path: &Path) -> Result<Self, CoreclawError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(CoreclawError::storage)?;
        }

        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path = %path.display(), "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(&self) -> Result<(), CoreclawError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Map a tokio-rusqlite error into the shared storage error.
pub fn map_tr_err(err: tokio_rusqlite::Error) -> CoreclawError {
    CoreclawError::Storage {
        source: Box::new(err),
    }
}

/// Current time as unix milliseconds, the unit used for bus scheduling.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current time as an ISO 8601 string, the format used for record timestamps.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_file_and_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/test.sqlite");
        let db = Database::open(&path).await.unwrap();
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn foreign_keys_are_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("fk.sqlite")).await.unwrap();
        let enabled: i64 = db
            .connection()
            .call(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn now_helpers_are_sane() {
        assert!(now_ms() > 1_700_000_000_000);
        assert!(now_iso().ends_with('Z'));
    }
}
