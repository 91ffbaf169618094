// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tool circuit breaker.
//!
//! Consecutive failures open the breaker for a cooldown; while open, calls
//! fail fast with the reopen time in the message.

use std::collections::HashMap;
use std::sync::Mutex;

use coreclaw_core::CoreclawError;

#[derive(Debug, Default, Clone)]
struct BreakerState {
    consecutive_failures: u32,
    open_until_ms: Option<i64>,
}

/// Tracks consecutive failures per tool name.
pub struct CircuitBreaker {
    open_after: u32,
    reset_ms: u64,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(open_after: u32, reset_ms: u64) -> Self {
        Self {
            open_after,
            reset_ms,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Fail fast while the breaker is open. An elapsed cooldown half-opens
    /// the breaker: the next call runs, and its outcome decides the state.
    pub fn check(&self, tool: &str, now_ms: i64) -> Result<(), CoreclawError> {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        if let Some(state) = states.get_mut(tool)
            && let Some(open_until) = state.open_until_ms
        {
            if now_ms < open_until {
                return Err(CoreclawError::CircuitOpen {
                    tool: tool.to_string(),
                    reopen_at: format_ms(open_until),
                });
            }
            state.open_until_ms = None;
        }
        Ok(())
    }

    /// A successful call resets the failure streak and closes the breaker.
    pub fn record_success(&self, tool: &str) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        states.insert(tool.to_string(), BreakerState::default());
    }

    /// A failed call extends the streak; at the threshold the breaker opens.
    pub fn record_failure(&self, tool: &str, now_ms: i64) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        let state = states.entry(tool.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.open_after {
            state.open_until_ms = Some(now_ms + self.reset_ms as i64);
            state.consecutive_failures = 0;
        }
    }
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
        .unwrap_or_else(|| format!("{ms}ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_breaker_allows_calls() {
        let breaker = CircuitBreaker::new(3, 1_000);
        breaker.check("shell.exec", 0).unwrap();
    }

    #[test]
    fn opens_after_threshold_and_names_reopen_time() {
        let breaker = CircuitBreaker::new(2, 5_000);
        breaker.record_failure("shell.exec", 100);
        breaker.check("shell.exec", 100).unwrap();
        breaker.record_failure("shell.exec", 200);

        let err = breaker.check("shell.exec", 300).unwrap_err();
        match err {
            CoreclawError::CircuitOpen { tool, reopen_at } => {
                assert_eq!(tool, "shell.exec");
                assert!(!reopen_at.is_empty());
            }
            other => panic!("expected CircuitOpen, got {other}"),
        }
    }

    #[test]
    fn cooldown_elapses_and_success_closes() {
        let breaker = CircuitBreaker::new(1, 1_000);
        breaker.record_failure("web.fetch", 0);
        assert!(breaker.check("web.fetch", 500).is_err());

        // Past the cooldown the breaker half-opens.
        breaker.check("web.fetch", 1_500).unwrap();
        breaker.record_success("web.fetch");
        breaker.check("web.fetch", 1_600).unwrap();
    }

    #[test]
    fn success_resets_failure_streak() {
        let breaker = CircuitBreaker::new(3, 1_000);
        breaker.record_failure("fs.write", 0);
        breaker.record_failure("fs.write", 1);
        breaker.record_success("fs.write");
        breaker.record_failure("fs.write", 2);
        breaker.record_failure("fs.write", 3);
        // Only two consecutive failures since the success: still closed.
        breaker.check("fs.write", 4).unwrap();
    }

    #[test]
    fn tools_are_independent() {
        let breaker = CircuitBreaker::new(1, 10_000);
        breaker.record_failure("shell.exec", 0);
        assert!(breaker.check("shell.exec", 1).is_err());
        breaker.check("web.fetch", 1).unwrap();
    }

    #[test]
    fn iso_formatting_is_plausible() {
        assert_eq!(format_ms(1_767_225_600_000), "2026-01-01T00:00:00Z");
    }
}
