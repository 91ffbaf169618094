// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Coreclaw runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Coreclaw configuration.
///
/// Loaded from a JSON file with `CORECLAW_` environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CoreclawConfig {
    /// Sandbox root for all tool filesystem access.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Directory holding the database and migration backups.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Explicit database file path. Defaults to `{data_dir}/coreclaw.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,

    /// Maximum persisted history per chat; older rows are pruned at compaction.
    #[serde(default = "default_history_max_messages")]
    pub history_max_messages: usize,

    /// Persist messages for unregistered chats too.
    #[serde(default)]
    pub store_full_messages: bool,

    /// Upper bound on tool-calling loop iterations per turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Tool output beyond this many characters is truncated.
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,

    /// Allow `shell.exec` at all.
    #[serde(default)]
    pub allow_shell: bool,

    /// When non-empty, `shell.exec` argv[0] must be in this list.
    #[serde(default)]
    pub allowed_shell_commands: Vec<String>,

    /// Per-command timeout for shell execution inside a worker.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Response body cap for `web.fetch`.
    #[serde(default = "default_max_response_chars")]
    pub max_response_chars: usize,

    /// Extra environment keys passed through to isolated workers.
    #[serde(default)]
    pub allowed_env: Vec<String>,

    /// When non-empty, `web.fetch` hosts must exact- or suffix-match.
    #[serde(default)]
    pub allowed_web_domains: Vec<String>,

    /// When non-empty, `web.fetch` ports must be in this list.
    #[serde(default)]
    pub allowed_web_ports: Vec<u16>,

    /// Ports `web.fetch` must never use.
    #[serde(default)]
    pub blocked_web_ports: Vec<u16>,

    /// Shared secret for the admin bootstrap protocol. Unset disables it.
    #[serde(default)]
    pub admin_bootstrap_key: Option<String>,

    /// Close the bootstrap protocol permanently after first successful use.
    #[serde(default = "default_true")]
    pub admin_bootstrap_single_use: bool,

    /// Failed bootstrap attempts before lockout.
    #[serde(default = "default_admin_bootstrap_max_attempts")]
    pub admin_bootstrap_max_attempts: u32,

    /// Lockout duration after too many failed bootstrap attempts.
    #[serde(default = "default_admin_bootstrap_lockout_minutes")]
    pub admin_bootstrap_lockout_minutes: u64,

    /// When non-empty, inbound sender ids must be in this list to be
    /// persisted as user messages.
    #[serde(default)]
    pub allowed_channel_identities: Vec<String>,

    /// Allowed MCP server/tool pairs: exact `server.tool` names or the
    /// `server/tool` alias.
    #[serde(default)]
    pub mcp_allowlist: Vec<String>,

    /// `default` or `hardened`. The hardened profile rejects permissive
    /// settings at startup.
    #[serde(default)]
    pub security_profile: SecurityProfile,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub isolation: IsolationConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub slo: SloConfig,
}

impl Default for CoreclawConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default config must deserialize")
    }
}

impl CoreclawConfig {
    /// Resolved database file path.
    pub fn sqlite_path(&self) -> PathBuf {
        match &self.sqlite_path {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(&self.data_dir).join("coreclaw.sqlite"),
        }
    }

    /// Directory for pre-migration backups.
    pub fn backup_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("backups")
    }
}

fn default_workspace_dir() -> String {
    "./workspace".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_history_max_messages() -> usize {
    50
}

fn default_max_tool_iterations() -> usize {
    10
}

fn default_max_tool_output_chars() -> usize {
    30_000
}

fn default_command_timeout_ms() -> u64 {
    30_000
}

fn default_max_response_chars() -> usize {
    100_000
}

fn default_admin_bootstrap_max_attempts() -> u32 {
    5
}

fn default_admin_bootstrap_lockout_minutes() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

/// Startup-time configuration gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProfile {
    #[default]
    Default,
    Hardened,
}

/// Language-model provider settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Chat-completions endpoint base URL.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Bearer token. `None` falls back to the environment.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_provider_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: Option<f64>,

    /// Per-request deadline.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// Model context window used for prompt budgeting.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u32,

    /// Tokens reserved for the model's reply.
    #[serde(default = "default_reserve_output_tokens")]
    pub reserve_output_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default provider config must deserialize")
    }
}

fn default_provider_base_url() -> String {
    "http://127.0.0.1:11434/v1/chat/completions".to_string()
}

fn default_provider_model() -> String {
    "coreclaw-default".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    60_000
}

fn default_max_input_tokens() -> u32 {
    32_768
}

fn default_reserve_output_tokens() -> u32 {
    4_096
}

/// Durable message bus settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// Dispatch poll interval per direction.
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Maximum records claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Handler attempts before dead-lettering.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base retry backoff, doubled per attempt.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff ceiling.
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,

    /// Overall deadline for one record's handlers; also the stale-claim
    /// horizon for restart recovery.
    #[serde(default = "default_processing_timeout_ms")]
    pub processing_timeout_ms: u64,

    /// Pending-queue capacity before inbound publishes overflow.
    #[serde(default = "default_max_pending")]
    pub max_pending_inbound: usize,

    /// Pending-queue capacity before outbound publishes overflow.
    #[serde(default = "default_max_pending")]
    pub max_pending_outbound: usize,

    /// Pending count above which dispatch sleeps before each record.
    #[serde(default = "default_overload_pending_threshold")]
    pub overload_pending_threshold: usize,

    /// Advisory sleep applied under overload.
    #[serde(default = "default_overload_backoff_ms")]
    pub overload_backoff_ms: u64,

    /// Per-chat rate-limit window.
    #[serde(default = "default_rate_limit_window_ms")]
    pub per_chat_rate_limit_window_ms: u64,

    /// Inbound publishes allowed per chat within the window.
    #[serde(default = "default_rate_limit_max")]
    pub per_chat_rate_limit_max: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default bus config must deserialize")
    }
}

fn default_poll_ms() -> u64 {
    250
}

fn default_batch_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_max_retry_backoff_ms() -> u64 {
    60_000
}

fn default_processing_timeout_ms() -> u64 {
    120_000
}

fn default_max_pending() -> usize {
    1_000
}

fn default_overload_pending_threshold() -> usize {
    100
}

fn default_overload_backoff_ms() -> u64 {
    250
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_max() -> usize {
    30
}

/// Scheduler settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Tick interval for finding due tasks.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

fn default_tick_ms() -> u64 {
    5_000
}

/// Heartbeat source settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Interval between heartbeat wake attempts.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub interval_ms: u64,

    /// Wake events inside this window coalesce; the latest wins.
    #[serde(default = "default_wake_debounce_ms")]
    pub wake_debounce_ms: u64,

    /// Deferral when the chat is busy with pending inbound work.
    #[serde(default = "default_wake_retry_ms")]
    pub wake_retry_ms: u64,

    /// File holding the heartbeat prompt text.
    #[serde(default = "default_heartbeat_prompt_path")]
    pub prompt_path: String,

    /// `HH:mm-HH:mm` local window; empty means always active.
    #[serde(default)]
    pub active_hours: String,

    /// Skip the wake while the chat has inbound records in flight.
    #[serde(default = "default_true")]
    pub skip_when_inbound_busy: bool,

    /// Assistant reply equal to this token is treated as "nothing to say".
    #[serde(default = "default_ack_token")]
    pub ack_token: String,

    /// Drop outbound acks instead of delivering them.
    #[serde(default = "default_true")]
    pub suppress_ack: bool,

    /// Identical assistant content within this window is dropped.
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: u64,

    /// Wakes emitted per interval tick at most.
    #[serde(default = "default_max_dispatch_per_run")]
    pub max_dispatch_per_run: usize,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default heartbeat config must deserialize")
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    1_800_000
}

fn default_wake_debounce_ms() -> u64 {
    5_000
}

fn default_wake_retry_ms() -> u64 {
    30_000
}

fn default_heartbeat_prompt_path() -> String {
    "HEARTBEAT.md".to_string()
}

fn default_ack_token() -> String {
    "HEARTBEAT_OK".to_string()
}

fn default_dedupe_window_ms() -> u64 {
    3_600_000
}

fn default_max_dispatch_per_run() -> usize {
    5
}

/// Isolated tool runtime settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IsolationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tools that must run in a child-process worker.
    #[serde(default = "default_isolated_tools")]
    pub tool_names: Vec<String>,

    /// Baseline wall-clock timeout per worker.
    #[serde(default = "default_worker_timeout_ms")]
    pub worker_timeout_ms: u64,

    /// Cap on accumulated worker stdout+stderr.
    #[serde(default = "default_max_worker_output_chars")]
    pub max_worker_output_chars: usize,

    /// Concurrent worker processes.
    #[serde(default = "default_max_concurrent_workers")]
    pub max_concurrent_workers: usize,

    /// Consecutive failures before the per-tool breaker opens.
    #[serde(default = "default_open_circuit_after_failures")]
    pub open_circuit_after_failures: u32,

    /// How long an open breaker rejects calls.
    #[serde(default = "default_circuit_reset_ms")]
    pub circuit_reset_ms: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default isolation config must deserialize")
    }
}

fn default_isolated_tools() -> Vec<String> {
    vec![
        "shell.exec".to_string(),
        "web.fetch".to_string(),
        "fs.write".to_string(),
    ]
}

fn default_worker_timeout_ms() -> u64 {
    60_000
}

fn default_max_worker_output_chars() -> usize {
    200_000
}

fn default_max_concurrent_workers() -> usize {
    4
}

fn default_open_circuit_after_failures() -> u32 {
    5
}

fn default_circuit_reset_ms() -> u64 {
    60_000
}

/// Webhook channel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_loopback_host")]
    pub host: String,

    #[serde(default = "default_webhook_port")]
    pub port: u16,

    /// Inbound POST path; the outbox drain lives at `{path}/outbound`.
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Bearer token required on every request. `None` disables auth.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Request body size cap in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Outbox retention bounds.
    #[serde(default = "default_outbox_max_per_chat")]
    pub outbox_max_per_chat: usize,

    #[serde(default = "default_outbox_max_chats")]
    pub outbox_max_chats: usize,

    #[serde(default = "default_outbox_chat_ttl_ms")]
    pub outbox_chat_ttl_ms: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default webhook config must deserialize")
    }
}

fn default_loopback_host() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_port() -> u16 {
    8710
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_max_body_bytes() -> usize {
    262_144
}

fn default_outbox_max_per_chat() -> usize {
    200
}

fn default_outbox_max_chats() -> usize {
    100
}

fn default_outbox_chat_ttl_ms() -> u64 {
    3_600_000
}

/// Observability HTTP listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_loopback_host")]
    pub host: String,

    #[serde(default = "default_observability_port")]
    pub port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default observability config must deserialize")
    }
}

fn default_observability_port() -> u16 {
    8711
}

/// SLO thresholds and alerting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SloConfig {
    #[serde(default = "default_max_pending_queue")]
    pub max_pending_queue: u64,

    #[serde(default = "default_max_dead_letter_queue")]
    pub max_dead_letter_queue: u64,

    /// Tool failure ratio (0.0–1.0) above which an alert fires.
    #[serde(default = "default_max_tool_failure_rate")]
    pub max_tool_failure_rate: f64,

    #[serde(default = "default_max_scheduler_delay_ms")]
    pub max_scheduler_delay_ms: u64,

    /// MCP failure ratio (0.0–1.0) above which an alert fires.
    #[serde(default = "default_max_mcp_failure_rate")]
    pub max_mcp_failure_rate: f64,

    /// POST target for alert JSON. `None` disables alerting.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,

    /// Minimum spacing between alerts for the same breach.
    #[serde(default = "default_alert_cooldown_ms")]
    pub alert_cooldown_ms: u64,

    /// Threshold evaluation interval.
    #[serde(default = "default_slo_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for SloConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("default slo config must deserialize")
    }
}

fn default_max_pending_queue() -> u64 {
    500
}

fn default_max_dead_letter_queue() -> u64 {
    50
}

fn default_max_tool_failure_rate() -> f64 {
    0.5
}

fn default_max_scheduler_delay_ms() -> u64 {
    60_000
}

fn default_max_mcp_failure_rate() -> f64 {
    0.5
}

fn default_alert_cooldown_ms() -> u64 {
    300_000
}

fn default_slo_check_interval_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = CoreclawConfig::default();
        assert_eq!(config.history_max_messages, 50);
        assert_eq!(config.bus.max_attempts, 3);
        assert_eq!(config.security_profile, SecurityProfile::Default);
        assert!(!config.allow_shell);
        assert!(config.isolation.tool_names.contains(&"fs.write".to_string()));
    }

    #[test]
    fn sqlite_path_derives_from_data_dir() {
        let config = CoreclawConfig::default();
        assert_eq!(
            config.sqlite_path(),
            PathBuf::from("./data").join("coreclaw.sqlite")
        );
    }

    #[test]
    fn sqlite_path_explicit_override_wins() {
        let config = CoreclawConfig {
            sqlite_path: Some("/tmp/other.sqlite".to_string()),
            ..CoreclawConfig::default()
        };
        assert_eq!(config.sqlite_path(), PathBuf::from("/tmp/other.sqlite"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<CoreclawConfig, _> =
            serde_json::from_str(r#"{"no_such_option": true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn security_profile_parses_lowercase() {
        let config: CoreclawConfig =
            serde_json::from_str(r#"{"security_profile": "hardened"}"#).unwrap();
        assert_eq!(config.security_profile, SecurityProfile::Hardened);
    }
}
