// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin bootstrap protocol.
//!
//! Elevates the first chat to the admin role using a shared secret, with
//! attempt counting, lockout, and an optional single-use latch. All state
//! lives in `meta_kv` so it survives restarts.

use coreclaw_config::CoreclawConfig;
use coreclaw_core::CoreclawError;
use coreclaw_storage::{ChatRecord, Storage};
use tracing::{info, warn};

const USED_KEY: &str = "admin_bootstrap.used";
const FAILED_ATTEMPTS_KEY: &str = "admin_bootstrap.failed_attempts";
const LOCK_UNTIL_KEY: &str = "admin_bootstrap.lock_until";

/// Attempt to elevate `chat` to admin with the presented key.
pub async fn register_admin(
    storage: &Storage,
    config: &CoreclawConfig,
    chat: &ChatRecord,
    presented_key: &str,
    now_ms: i64,
) -> Result<(), CoreclawError> {
    let Some(expected) = config.admin_bootstrap_key.as_deref() else {
        return Err(CoreclawError::PolicyDenied(
            "admin bootstrap is not configured".to_string(),
        ));
    };
    if expected.is_empty() {
        return Err(CoreclawError::PolicyDenied(
            "admin bootstrap is not configured".to_string(),
        ));
    }

    if storage.meta_get(USED_KEY).await?.as_deref() == Some("true") {
        return Err(CoreclawError::PolicyDenied(
            "admin bootstrap has already been used".to_string(),
        ));
    }

    if storage.count_admin_chats().await? > 0 {
        return Err(CoreclawError::PolicyDenied(
            "an admin chat already exists".to_string(),
        ));
    }

    if let Some(lock_until) = storage.meta_get(LOCK_UNTIL_KEY).await? {
        let lock_until: i64 = lock_until.parse().unwrap_or(0);
        if lock_until > now_ms {
            return Err(CoreclawError::PolicyDenied(
                "admin bootstrap is locked out after repeated failures".to_string(),
            ));
        }
    }

    if presented_key != expected {
        let failed: u32 = storage
            .meta_get(FAILED_ATTEMPTS_KEY)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
            + 1;
        if failed >= config.admin_bootstrap_max_attempts {
            let lock_until = now_ms + (config.admin_bootstrap_lockout_minutes * 60_000) as i64;
            storage
                .meta_set(LOCK_UNTIL_KEY, &lock_until.to_string(), now_ms)
                .await?;
            storage.meta_set(FAILED_ATTEMPTS_KEY, "0", now_ms).await?;
            warn!(chat = chat.id, "admin bootstrap locked out");
        } else {
            storage
                .meta_set(FAILED_ATTEMPTS_KEY, &failed.to_string(), now_ms)
                .await?;
        }
        return Err(CoreclawError::PolicyDenied(
            "invalid bootstrap key".to_string(),
        ));
    }

    storage.meta_delete(FAILED_ATTEMPTS_KEY).await?;
    storage.meta_delete(LOCK_UNTIL_KEY).await?;
    storage.set_chat_role(chat.id, "admin").await?;
    if config.admin_bootstrap_single_use {
        storage.meta_set(USED_KEY, "true", now_ms).await?;
    }
    info!(chat = chat.id, "chat elevated to admin via bootstrap");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup(key: Option<&str>) -> (Storage, ChatRecord, CoreclawConfig, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = coreclaw_storage::open_in_dir(dir.path()).await.unwrap();
        let chat = storage.get_or_create_chat("cli", "alice").await.unwrap();
        let config = CoreclawConfig {
            admin_bootstrap_key: key.map(str::to_string),
            admin_bootstrap_max_attempts: 3,
            admin_bootstrap_lockout_minutes: 15,
            ..CoreclawConfig::default()
        };
        (storage, chat, config, dir)
    }

    #[tokio::test]
    async fn successful_bootstrap_elevates_and_latches() {
        let (storage, chat, config, _dir) = setup(Some("s3cret")).await;
        register_admin(&storage, &config, &chat, "s3cret", 1_000)
            .await
            .unwrap();

        let elevated = storage.get_chat(chat.id).await.unwrap().unwrap();
        assert!(elevated.is_admin());

        // Single-use: the protocol is now permanently closed, even for a
        // fresh chat with the right key (after the admin went away).
        let other = storage.get_or_create_chat("cli", "bob").await.unwrap();
        let err = register_admin(&storage, &config, &other, "s3cret", 2_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already been used"));
    }

    #[tokio::test]
    async fn unconfigured_key_denies() {
        let (storage, chat, config, _dir) = setup(None).await;
        let err = register_admin(&storage, &config, &chat, "anything", 1_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn existing_admin_blocks_bootstrap() {
        let (storage, chat, config, _dir) = setup(Some("k")).await;
        let other = storage.get_or_create_chat("cli", "bob").await.unwrap();
        storage.set_chat_role(other.id, "admin").await.unwrap();

        let err = register_admin(&storage, &config, &chat, "k", 1_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn repeated_failures_lock_out_then_expire() {
        let (storage, chat, config, _dir) = setup(Some("right")).await;

        for _ in 0..3 {
            let err = register_admin(&storage, &config, &chat, "wrong", 1_000)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("invalid bootstrap key"));
        }

        // Locked out now, even with the correct key.
        let err = register_admin(&storage, &config, &chat, "right", 2_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("locked out"));

        // After the lockout window, the correct key works.
        let after = 2_000 + 15 * 60_000 + 1;
        register_admin(&storage, &config, &chat, "right", after)
            .await
            .unwrap();
        assert!(storage.get_chat(chat.id).await.unwrap().unwrap().is_admin());
    }

    #[tokio::test]
    async fn multi_use_bootstrap_stays_open_until_admin_exists() {
        let (storage, chat, mut config, _dir) = setup(Some("k")).await;
        config.admin_bootstrap_single_use = false;

        register_admin(&storage, &config, &chat, "k", 1_000)
            .await
            .unwrap();
        // Not latched, but the existing admin still blocks further use.
        let other = storage.get_or_create_chat("cli", "bob").await.unwrap();
        let err = register_admin(&storage, &config, &other, "k", 2_000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
