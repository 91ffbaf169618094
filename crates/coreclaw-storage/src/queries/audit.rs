// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit trail.

use coreclaw_core::CoreclawError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::AuditEventRecord;

/// Append one audit event. Arguments must already be redacted.
pub async fn insert(
    db: &Database,
    kind: &str,
    tool_name: Option<&str>,
    outcome: &str,
    reason: Option<&str>,
    args_json: Option<&str>,
    now_ms: i64,
) -> Result<i64, CoreclawError> {
    let kind = kind.to_string();
    let tool_name = tool_name.map(str::to_string);
    let outcome = outcome.to_string();
    let reason = reason.map(str::to_string);
    let args_json = args_json.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_events (kind, tool_name, outcome, reason, args_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![kind, tool_name, outcome, reason, args_json, now_ms],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent audit events, newest first.
pub async fn list_recent(
    db: &Database,
    limit: usize,
) -> Result<Vec<AuditEventRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, kind, tool_name, outcome, reason, args_json, created_at
                 FROM audit_events ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(AuditEventRecord {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        tool_name: row.get(2)?,
                        outcome: row.get(3)?,
                        reason: row.get(4)?,
                        args_json: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    #[tokio::test]
    async fn insert_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.sqlite");
        let db = Database::open(&path).await.unwrap();
        run_migrations(&db, &path, &dir.path().join("backups"))
            .await
            .unwrap();

        insert(&db, "tool.execute", Some("fs.write"), "ok", None, Some("{}"), 1_000)
            .await
            .unwrap();
        insert(
            &db,
            "tool.execute",
            Some("shell.exec"),
            "denied",
            Some("requires role admin"),
            None,
            2_000,
        )
        .await
        .unwrap();

        let events = list_recent(&db, 10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].outcome, "denied");
        assert_eq!(events[1].tool_name.as_deref(), Some("fs.write"));
    }
}
