// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Merge order: compiled defaults, then the JSON config file, then
//! `CORECLAW_` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};

use crate::model::CoreclawConfig;

/// Load configuration from `./coreclaw.json` (if present) with env overrides.
pub fn load_config() -> Result<CoreclawConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoreclawConfig::default()))
        .merge(Json::file("coreclaw.json"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CoreclawConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoreclawConfig::default()))
        .merge(Json::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a JSON string only (no file lookup, no env).
///
/// Used for testing and explicit inline configuration.
pub fn load_config_from_str(json: &str) -> Result<CoreclawConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CoreclawConfig::default()))
        .merge(Json::string(json))
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `CORECLAW_BUS_MAX_ATTEMPTS` must map to
/// `bus.max_attempts`, not `bus.max.attempts`.
fn env_provider() -> Env {
    Env::prefixed("CORECLAW_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("provider_", "provider.", 1)
            .replacen("bus_", "bus.", 1)
            .replacen("scheduler_", "scheduler.", 1)
            .replacen("heartbeat_", "heartbeat.", 1)
            .replacen("isolation_", "isolation.", 1)
            .replacen("webhook_", "webhook.", 1)
            .replacen("observability_", "observability.", 1)
            .replacen("slo_", "slo.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SecurityProfile;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.bus.batch_size, 10);
        assert_eq!(config.scheduler.tick_ms, 5_000);
    }

    #[test]
    fn json_overrides_defaults() {
        let config = load_config_from_str(
            r#"{
                "history_max_messages": 10,
                "bus": {"max_attempts": 7},
                "security_profile": "hardened"
            }"#,
        )
        .unwrap();
        assert_eq!(config.history_max_messages, 10);
        assert_eq!(config.bus.max_attempts, 7);
        assert_eq!(config.security_profile, SecurityProfile::Hardened);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = load_config_from_str(r#"{"bus": {"poll_ms": 50}}"#).unwrap();
        assert_eq!(config.bus.poll_ms, 50);
        assert_eq!(config.bus.max_attempts, 3);
    }

    #[test]
    fn file_loading_works() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coreclaw.json");
        std::fs::write(&path, r#"{"data_dir": "/var/lib/coreclaw"}"#).unwrap();
        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.data_dir, "/var/lib/coreclaw");
    }

    #[test]
    fn unknown_file_key_is_an_error() {
        let result = load_config_from_str(r#"{"typo_key": 1}"#);
        assert!(result.is_err());
    }
}
