// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model, loader, and startup validation for Coreclaw.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    BusConfig, CoreclawConfig, HeartbeatConfig, IsolationConfig, ObservabilityConfig,
    ProviderConfig, SchedulerConfig, SecurityProfile, SloConfig, WebhookConfig,
};
pub use validation::{parse_active_hours, validate};
