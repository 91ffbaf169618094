// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup-time configuration validation.
//!
//! General sanity checks run for every profile; the hardened profile
//! additionally rejects permissive settings. Violations are fatal.

use std::net::IpAddr;

use coreclaw_core::CoreclawError;

use crate::model::{CoreclawConfig, SecurityProfile};

/// Validate the configuration, returning `ConfigInvalid` on the first violation.
pub fn validate(config: &CoreclawConfig) -> Result<(), CoreclawError> {
    if config.bus.max_attempts == 0 {
        return Err(CoreclawError::Config(
            "bus.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.bus.batch_size == 0 {
        return Err(CoreclawError::Config(
            "bus.batch_size must be at least 1".to_string(),
        ));
    }
    if config.history_max_messages == 0 {
        return Err(CoreclawError::Config(
            "history_max_messages must be at least 1".to_string(),
        ));
    }
    if config.provider.reserve_output_tokens >= config.provider.max_input_tokens {
        return Err(CoreclawError::Config(
            "provider.reserve_output_tokens must be below provider.max_input_tokens".to_string(),
        ));
    }
    if !config.heartbeat.active_hours.is_empty()
        && parse_active_hours(&config.heartbeat.active_hours).is_none()
    {
        return Err(CoreclawError::Config(format!(
            "heartbeat.active_hours must be HH:mm-HH:mm, got {:?}",
            config.heartbeat.active_hours
        )));
    }

    if config.security_profile == SecurityProfile::Hardened {
        validate_hardened(config)?;
    }
    Ok(())
}

fn validate_hardened(config: &CoreclawConfig) -> Result<(), CoreclawError> {
    if config.allow_shell {
        return Err(CoreclawError::Config(
            "hardened profile forbids allow_shell=true".to_string(),
        ));
    }
    if config.allowed_web_domains.is_empty() {
        return Err(CoreclawError::Config(
            "hardened profile requires a non-empty allowed_web_domains list".to_string(),
        ));
    }
    if config.webhook.enabled {
        if !is_loopback_host(&config.webhook.host) {
            return Err(CoreclawError::Config(format!(
                "hardened profile requires the webhook listener to bind a loopback host, got {:?}",
                config.webhook.host
            )));
        }
        if config
            .webhook
            .auth_token
            .as_deref()
            .is_none_or(|token| token.is_empty())
        {
            return Err(CoreclawError::Config(
                "hardened profile requires webhook.auth_token when the webhook is enabled"
                    .to_string(),
            ));
        }
    }
    if config.observability.enabled && !is_loopback_host(&config.observability.host) {
        return Err(CoreclawError::Config(format!(
            "hardened profile requires the observability listener to bind a loopback host, got {:?}",
            config.observability.host
        )));
    }
    Ok(())
}

fn is_loopback_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Parse an `HH:mm-HH:mm` window into minutes-of-day `(start, end)`.
///
/// The window may wrap past midnight (start > end).
pub fn parse_active_hours(spec: &str) -> Option<(u32, u32)> {
    let (start, end) = spec.split_once('-')?;
    Some((parse_hhmm(start)?, parse_hhmm(end)?))
}

fn parse_hhmm(text: &str) -> Option<u32> {
    let (hours, minutes) = text.split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoreclawConfig;

    fn hardened_base() -> CoreclawConfig {
        CoreclawConfig {
            security_profile: SecurityProfile::Hardened,
            allowed_web_domains: vec!["example.com".to_string()],
            ..CoreclawConfig::default()
        }
    }

    #[test]
    fn default_config_validates() {
        validate(&CoreclawConfig::default()).unwrap();
    }

    #[test]
    fn hardened_rejects_allow_shell() {
        let config = CoreclawConfig {
            allow_shell: true,
            ..hardened_base()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("allow_shell"));
    }

    #[test]
    fn hardened_requires_web_domains() {
        let config = CoreclawConfig {
            allowed_web_domains: vec![],
            ..hardened_base()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("allowed_web_domains"));
    }

    #[test]
    fn hardened_webhook_needs_loopback_and_token() {
        let mut config = hardened_base();
        config.webhook.enabled = true;
        config.webhook.host = "0.0.0.0".to_string();
        config.webhook.auth_token = Some("secret".to_string());
        assert!(validate(&config).is_err());

        config.webhook.host = "127.0.0.1".to_string();
        config.webhook.auth_token = None;
        assert!(validate(&config).is_err());

        config.webhook.auth_token = Some("secret".to_string());
        validate(&config).unwrap();
    }

    #[test]
    fn hardened_observability_needs_loopback() {
        let mut config = hardened_base();
        config.observability.enabled = true;
        config.observability.host = "0.0.0.0".to_string();
        assert!(validate(&config).is_err());

        config.observability.host = "::1".to_string();
        validate(&config).unwrap();
    }

    #[test]
    fn zero_max_attempts_rejected() {
        let mut config = CoreclawConfig::default();
        config.bus.max_attempts = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn active_hours_parsing() {
        assert_eq!(parse_active_hours("09:00-17:30"), Some((540, 1050)));
        assert_eq!(parse_active_hours("22:00-06:00"), Some((1320, 360)));
        assert!(parse_active_hours("9-17").is_none());
        assert!(parse_active_hours("25:00-26:00").is_none());

        let mut config = CoreclawConfig::default();
        config.heartbeat.active_hours = "bogus".to_string();
        assert!(validate(&config).is_err());
    }
}
