// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation state: per-chat summary, enabled skills, compaction marker.

use coreclaw_core::CoreclawError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, now_iso};
use crate::models::ConversationStateRecord;

/// Fetch the conversation state for a chat, if any exists yet.
pub async fn get(
    db: &Database,
    chat_fk: i64,
) -> Result<Option<ConversationStateRecord>, CoreclawError> {
    db.connection()
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT chat_fk, summary, enabled_skills, last_compact_at
                     FROM conversation_state WHERE chat_fk = ?1",
                    params![chat_fk],
                    |row| {
                        let skills_json: String = row.get(2)?;
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            skills_json,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row.map(|(chat_fk, summary, skills_json, last_compact_at)| {
                ConversationStateRecord {
                    chat_fk,
                    summary,
                    enabled_skills: serde_json::from_str(&skills_json).unwrap_or_default(),
                    last_compact_at,
                }
            }))
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the chat's summary and stamp the compaction time.
pub async fn set_summary(db: &Database, chat_fk: i64, summary: &str) -> Result<(), CoreclawError> {
    let summary = summary.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_state (chat_fk, summary, last_compact_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(chat_fk) DO UPDATE
                     SET summary = excluded.summary,
                         last_compact_at = excluded.last_compact_at",
                params![chat_fk, summary, now_iso()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the chat's enabled skill set.
pub async fn set_enabled_skills(
    db: &Database,
    chat_fk: i64,
    skills: &[String],
) -> Result<(), CoreclawError> {
    let skills_json =
        serde_json::to_string(skills).map_err(CoreclawError::storage)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO conversation_state (chat_fk, enabled_skills)
                 VALUES (?1, ?2)
                 ON CONFLICT(chat_fk) DO UPDATE SET enabled_skills = excluded.enabled_skills",
                params![chat_fk, skills_json],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::queries::chats;

    async fn setup() -> (Database, i64, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");
        let db = Database::open(&path).await.unwrap();
        run_migrations(&db, &path, &dir.path().join("backups"))
            .await
            .unwrap();
        let chat = chats::get_or_create(&db, "cli", "alice").await.unwrap();
        (db, chat.id, dir)
    }

    #[tokio::test]
    async fn missing_state_is_none() {
        let (db, chat_fk, _dir) = setup().await;
        assert!(get(&db, chat_fk).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_upserts_and_stamps_compaction() {
        let (db, chat_fk, _dir) = setup().await;

        set_summary(&db, chat_fk, "talked about rust").await.unwrap();
        let state = get(&db, chat_fk).await.unwrap().unwrap();
        assert_eq!(state.summary, "talked about rust");
        assert!(state.last_compact_at.is_some());

        set_summary(&db, chat_fk, "now about sqlite").await.unwrap();
        let state = get(&db, chat_fk).await.unwrap().unwrap();
        assert_eq!(state.summary, "now about sqlite");
    }

    #[tokio::test]
    async fn skills_round_trip() {
        let (db, chat_fk, _dir) = setup().await;

        set_enabled_skills(&db, chat_fk, &["notes".to_string(), "weather".to_string()])
            .await
            .unwrap();
        let state = get(&db, chat_fk).await.unwrap().unwrap();
        assert_eq!(state.enabled_skills, vec!["notes", "weather"]);

        // Skills update must not clobber an existing summary.
        set_summary(&db, chat_fk, "s").await.unwrap();
        set_enabled_skills(&db, chat_fk, &["notes".to_string()]).await.unwrap();
        let state = get(&db, chat_fk).await.unwrap().unwrap();
        assert_eq!(state.summary, "s");
        assert_eq!(state.enabled_skills, vec!["notes"]);
    }
}
