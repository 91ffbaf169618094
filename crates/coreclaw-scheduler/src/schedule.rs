// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schedule arithmetic for the three task kinds.
//!
//! Cron expressions use the `cron` crate's seconds-first dialect; plain
//! five-field expressions are accepted by prepending a zero seconds field.
//! Interval and once values are millisecond counts.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use coreclaw_core::CoreclawError;
use cron::Schedule;

/// Validate a schedule and compute the first run time.
pub fn initial_next_run(
    schedule_type: &str,
    schedule_value: &str,
    now_ms: i64,
) -> Result<i64, CoreclawError> {
    match schedule_type {
        "cron" => next_cron_after(schedule_value, now_ms),
        "interval" | "once" => {
            let delay: i64 = schedule_value.trim().parse().map_err(|_| {
                CoreclawError::BadArgs(format!(
                    "schedule_value {schedule_value:?} is not a millisecond count"
                ))
            })?;
            if delay < 0 {
                return Err(CoreclawError::BadArgs(
                    "schedule_value must not be negative".to_string(),
                ));
            }
            Ok(now_ms + delay)
        }
        other => Err(CoreclawError::BadArgs(format!(
            "unknown schedule_type {other:?}, expected cron, interval, or once"
        ))),
    }
}

/// Compute the run after a firing at `now_ms`. `None` means the task is
/// done (one-shot). Missed firings collapse: the next run is always
/// computed from now, never from the missed slot.
pub fn next_run_after_firing(
    schedule_type: &str,
    schedule_value: &str,
    now_ms: i64,
) -> Result<Option<i64>, CoreclawError> {
    match schedule_type {
        "cron" => Ok(Some(next_cron_after(schedule_value, now_ms)?)),
        "interval" => {
            let delay: i64 = schedule_value.trim().parse().map_err(|_| {
                CoreclawError::BadArgs(format!(
                    "schedule_value {schedule_value:?} is not a millisecond count"
                ))
            })?;
            Ok(Some(now_ms + delay.max(0)))
        }
        "once" => Ok(None),
        other => Err(CoreclawError::BadArgs(format!(
            "unknown schedule_type {other:?}"
        ))),
    }
}

fn next_cron_after(expression: &str, now_ms: i64) -> Result<i64, CoreclawError> {
    let schedule = parse_cron(expression)?;
    let now: DateTime<Utc> = DateTime::from_timestamp_millis(now_ms)
        .ok_or_else(|| CoreclawError::Internal(format!("invalid timestamp {now_ms}")))?;
    schedule
        .after(&now)
        .next()
        .map(|t| t.timestamp_millis())
        .ok_or_else(|| {
            CoreclawError::BadArgs(format!("cron expression {expression:?} never fires"))
        })
}

/// Parse a cron expression, accepting both the 6/7-field seconds-first
/// dialect and the common 5-field form.
pub fn parse_cron(expression: &str) -> Result<Schedule, CoreclawError> {
    let trimmed = expression.trim();
    let fields = trimmed.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|e| CoreclawError::BadArgs(format!("invalid cron expression: {e}")))
}
