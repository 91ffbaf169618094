// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parent-side isolated tool runtime.
//!
//! Each invocation acquires a worker slot, spawns a fresh child process
//! with a scrubbed environment, exchanges one JSON request/response pair
//! over stdio, and enforces a hard wall-clock timeout with an escalating
//! kill. Failures feed the per-tool circuit breaker.

use std::process::Stdio;
use std::time::Duration;

use coreclaw_config::IsolationConfig;
use coreclaw_core::CoreclawError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::worker::{WorkerRequest, WorkerResponse};

/// Environment keys always passed through to workers.
const DEFAULT_ENV_ALLOWLIST: &[&str] = &["PATH", "HOME", "TMPDIR", "LANG", "LC_ALL", "TZ"];

/// Extra padding on the output cap so a truncated-but-parseable response
/// still fits.
const OUTPUT_CAP_SLACK: usize = 4096;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Runs the configured subset of high-risk tools in child processes.
pub struct IsolatedToolRuntime {
    config: IsolationConfig,
    /// Extra permitted environment keys (validated against the key pattern).
    allowed_env: Vec<String>,
    /// Shell-exec command timeout, folded into the worker deadline.
    command_timeout_ms: u64,
    /// Program + leading args used to start a worker.
    worker_command: Vec<String>,
    slots: Semaphore,
    breaker: CircuitBreaker,
}

impl IsolatedToolRuntime {
    pub fn new(
        config: IsolationConfig,
        allowed_env: Vec<String>,
        command_timeout_ms: u64,
        worker_command: Vec<String>,
    ) -> Self {
        let slots = Semaphore::new(config.max_concurrent_workers.max(1));
        let breaker = CircuitBreaker::new(
            config.open_circuit_after_failures,
            config.circuit_reset_ms,
        );
        Self {
            config,
            allowed_env,
            command_timeout_ms,
            worker_command,
            slots,
            breaker,
        }
    }

    /// Worker command pointing at the current executable's hidden `worker`
    /// subcommand.
    pub fn self_worker_command() -> Vec<String> {
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "coreclaw".to_string());
        vec![exe, "worker".to_string()]
    }

    /// Whether the named tool must run in a worker.
    pub fn isolates(&self, tool: &str) -> bool {
        self.config.enabled && self.config.tool_names.iter().any(|t| t == tool)
    }

    /// Run one isolated invocation, returning the worker's `result` string.
    pub async fn run(&self, tool: &str, request: &WorkerRequest) -> Result<String, CoreclawError> {
        self.breaker.check(tool, now_ms())?;

        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| CoreclawError::Internal("worker semaphore closed".to_string()))?;

        let result = self.run_worker_process(request).await;
        match &result {
            Ok(_) => self.breaker.record_success(tool),
            Err(err) => {
                warn!(tool, error = %err, "isolated worker failed");
                self.breaker.record_failure(tool, now_ms());
            }
        }
        result
    }

    async fn run_worker_process(&self, request: &WorkerRequest) -> Result<String, CoreclawError> {
        let (program, args) = self
            .worker_command
            .split_first()
            .ok_or_else(|| CoreclawError::Internal("empty worker command".to_string()))?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear();
        for (key, value) in std::env::vars() {
            if self.env_allowed(&key) {
                command.env(&key, &value);
            }
        }
        command.kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            CoreclawError::IsolatedWorker(format!("failed to spawn worker: {e}"))
        })?;

        let payload = serde_json::to_vec(request)
            .map_err(|e| CoreclawError::IsolatedWorker(format!("failed to encode request: {e}")))?;
        {
            let mut stdin = child.stdin.take().ok_or_else(|| {
                CoreclawError::IsolatedWorker("worker stdin unavailable".to_string())
            })?;
            stdin.write_all(&payload).await.map_err(|e| {
                CoreclawError::IsolatedWorker(format!("failed to write request: {e}"))
            })?;
            stdin.shutdown().await.map_err(|e| {
                CoreclawError::IsolatedWorker(format!("failed to close stdin: {e}"))
            })?;
        }

        let mut stdout = child.stdout.take().ok_or_else(|| {
            CoreclawError::IsolatedWorker("worker stdout unavailable".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            CoreclawError::IsolatedWorker("worker stderr unavailable".to_string())
        })?;

        let cap = self.config.max_worker_output_chars + OUTPUT_CAP_SLACK;
        let deadline = Duration::from_millis(
            self.config
                .worker_timeout_ms
                .max(self.command_timeout_ms + 2_000),
        );

        let io = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (a, b) = tokio::join!(
                read_bounded(&mut stdout, &mut out, cap),
                read_bounded(&mut stderr, &mut err, cap)
            );
            a?;
            b?;
            let status = child.wait().await.map_err(|e| {
                CoreclawError::IsolatedWorker(format!("failed to reap worker: {e}"))
            })?;
            Ok::<_, CoreclawError>((status, out, err))
        };

        let (status, out_bytes, err_bytes) = match tokio::time::timeout(deadline, io).await {
            Ok(result) => result?,
            Err(_) => {
                self.terminate(&mut child).await;
                return Err(CoreclawError::IsolatedWorker(format!(
                    "worker timed out after {}ms",
                    deadline.as_millis()
                )));
            }
        };

        let total = out_bytes.len() + err_bytes.len();
        let stdout_text = String::from_utf8_lossy(&out_bytes).to_string();
        if total > cap && stdout_text.trim().is_empty() {
            return Err(CoreclawError::IsolatedWorker(
                "output exceeded limit".to_string(),
            ));
        }

        if !status.success() {
            let stderr_text = String::from_utf8_lossy(&err_bytes);
            return Err(CoreclawError::IsolatedWorker(format!(
                "worker exited with {status}: {}",
                stderr_text.trim()
            )));
        }

        let response: WorkerResponse =
            serde_json::from_str(stdout_text.trim()).map_err(|e| {
                CoreclawError::IsolatedWorker(format!("unparseable worker response: {e}"))
            })?;
        if response.ok {
            debug!("worker completed");
            Ok(response.result.unwrap_or_default())
        } else {
            Err(CoreclawError::IsolatedWorker(
                response.error.unwrap_or_else(|| "unknown worker error".to_string()),
            ))
        }
    }

    /// Graceful termination, then force kill after one second.
    async fn terminate(&self, child: &mut tokio::process::Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
            let grace = tokio::time::timeout(Duration::from_secs(1), child.wait()).await;
            if grace.is_ok() {
                return;
            }
        }
        let _ = child.kill().await;
    }

    fn env_allowed(&self, key: &str) -> bool {
        if DEFAULT_ENV_ALLOWLIST.contains(&key) {
            return true;
        }
        self.allowed_env.iter().any(|k| k == key) && valid_env_key(key)
    }
}

/// Permitted extra env keys must look like conventional variable names.
fn valid_env_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

async fn read_bounded<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    cap: usize,
) -> Result<(), CoreclawError> {
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk).await.map_err(|e| {
            CoreclawError::IsolatedWorker(format!("failed to read worker output: {e}"))
        })?;
        if read == 0 {
            return Ok(());
        }
        // Keep reading past the cap so the child is not blocked on a full
        // pipe, but stop accumulating.
        if buffer.len() < cap + 1 {
            let take = read.min(cap + 1 - buffer.len());
            buffer.extend_from_slice(&chunk[..take]);
        }
    }
}
