// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker-side implementation of the isolated tools.
//!
//! The parent writes one JSON request to the child's stdin; the child
//! executes it and writes `{ok:true,result}` or `{ok:false,error}` to
//! stdout. The executors are also callable in-process for tools that are
//! not in the isolated subset.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use coreclaw_core::CoreclawError;
use coreclaw_security::{UrlPolicy, check_url, resolve_in_workspace, tokenize};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// One isolated tool invocation, dispatched by tool name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool")]
pub enum WorkerRequest {
    #[serde(rename = "shell.exec")]
    ShellExec(ShellExecRequest),
    #[serde(rename = "web.fetch")]
    WebFetch(WebFetchRequest),
    #[serde(rename = "fs.write")]
    FsWrite(FsWriteRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellExecRequest {
    pub command: String,
    pub allow_shell: bool,
    /// When non-empty, argv[0] must be listed here.
    pub allowed_commands: Vec<String>,
    pub workdir: String,
    pub timeout_ms: u64,
    /// Per-stream output cap.
    pub max_output_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebFetchRequest {
    pub url: String,
    pub allowed_domains: Vec<String>,
    pub allowed_ports: Vec<u16>,
    pub blocked_ports: Vec<u16>,
    pub max_response_chars: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsWriteRequest {
    pub workspace_dir: String,
    pub path: String,
    pub content: String,
    pub append: bool,
}

/// Wire response from the worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerResponse {
    pub fn success(result: String) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Execute one request. Shared by the worker main and in-process fallback.
pub async fn execute(request: WorkerRequest) -> WorkerResponse {
    let result = match request {
        WorkerRequest::ShellExec(req) => shell_exec(req).await,
        WorkerRequest::WebFetch(req) => web_fetch(req).await,
        WorkerRequest::FsWrite(req) => fs_write(req).await,
    };
    match result {
        Ok(output) => WorkerResponse::success(output),
        Err(err) => WorkerResponse::failure(err.to_string()),
    }
}

/// Worker main: read one JSON request from stdin, write one JSON response
/// to stdout. Returns the process exit code.
pub async fn run_worker() -> i32 {
    let mut input = String::new();
    if let Err(err) = tokio::io::stdin().read_to_string(&mut input).await {
        eprintln!("worker: failed to read request: {err}");
        return 1;
    }

    let response = match serde_json::from_str::<WorkerRequest>(&input) {
        Ok(request) => execute(request).await,
        Err(err) => WorkerResponse::failure(format!("malformed worker request: {err}")),
    };

    let body = serde_json::to_string(&response).unwrap_or_else(|err| {
        format!(r#"{{"ok":false,"error":"failed to encode response: {err}"}}"#)
    });
    let mut stdout = tokio::io::stdout();
    if stdout.write_all(body.as_bytes()).await.is_err() {
        return 1;
    }
    let _ = stdout.flush().await;
    0
}

async fn shell_exec(req: ShellExecRequest) -> Result<String, CoreclawError> {
    if !req.allow_shell {
        return Err(CoreclawError::PolicyDenied(
            "shell execution is disabled (allow_shell=false)".to_string(),
        ));
    }
    let argv = tokenize(&req.command)?;
    let Some((program, args)) = argv.split_first() else {
        return Err(CoreclawError::BadArgs("empty command".to_string()));
    };
    if !req.allowed_commands.is_empty() && !req.allowed_commands.iter().any(|c| c == program) {
        return Err(CoreclawError::PolicyDenied(format!(
            "command {program:?} is not in allowed_shell_commands"
        )));
    }

    // No shell interpreter: the tokenized argv is spawned directly.
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(&req.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(Duration::from_millis(req.timeout_ms), command.output())
        .await
        .map_err(|_| {
            CoreclawError::IsolatedWorker(format!(
                "command timed out after {}ms",
                req.timeout_ms
            ))
        })?
        .map_err(|e| CoreclawError::IsolatedWorker(format!("failed to spawn {program}: {e}")))?;

    let stdout = bound_lossy(&output.stdout, req.max_output_chars);
    let stderr = bound_lossy(&output.stderr, req.max_output_chars);

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(CoreclawError::IsolatedWorker(format!(
            "exit code {code}\nstdout:\n{stdout}\nstderr:\n{stderr}"
        )));
    }
    if stderr.is_empty() {
        Ok(stdout)
    } else {
        Ok(format!("{stdout}\nstderr:\n{stderr}"))
    }
}

async fn web_fetch(req: WebFetchRequest) -> Result<String, CoreclawError> {
    let policy = UrlPolicy {
        allowed_domains: req.allowed_domains.clone(),
        allowed_ports: req.allowed_ports.clone(),
        blocked_ports: req.blocked_ports.clone(),
    };
    let url = check_url(&req.url, &policy).await?;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_millis(req.timeout_ms))
        .build()
        .map_err(|e| CoreclawError::IsolatedWorker(format!("failed to build client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| CoreclawError::IsolatedWorker(format!("request failed: {e}")))?;

    let status = response.status();
    if status.is_redirection() {
        return Err(CoreclawError::PolicyDenied(format!(
            "redirect responses are not followed (got {status})"
        )));
    }

    let headers: serde_json::Map<String, serde_json::Value> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                serde_json::Value::String(value.to_str().unwrap_or("").to_string()),
            )
        })
        .collect();

    let body = response
        .text()
        .await
        .map_err(|e| CoreclawError::IsolatedWorker(format!("failed to read body: {e}")))?;
    let truncated = body.chars().count() > req.max_response_chars;
    let body: String = body.chars().take(req.max_response_chars).collect();

    let payload = serde_json::json!({
        "status": status.as_u16(),
        "headers": headers,
        "body": body,
        "truncated": truncated,
    });
    Ok(payload.to_string())
}

async fn fs_write(req: FsWriteRequest) -> Result<String, CoreclawError> {
    let resolved = resolve_in_workspace(Path::new(&req.workspace_dir), &req.path)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreclawError::IsolatedWorker(format!("mkdir failed: {e}")))?;
    }
    if req.append {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .await
            .map_err(|e| CoreclawError::IsolatedWorker(format!("open failed: {e}")))?;
        file.write_all(req.content.as_bytes())
            .await
            .map_err(|e| CoreclawError::IsolatedWorker(format!("write failed: {e}")))?;
    } else {
        tokio::fs::write(&resolved, req.content.as_bytes())
            .await
            .map_err(|e| CoreclawError::IsolatedWorker(format!("write failed: {e}")))?;
    }
    Ok(format!(
        "wrote {} bytes to {}",
        req.content.len(),
        req.path
    ))
}

fn bound_lossy(bytes: &[u8], max_chars: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect()
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn shell_request(command: &str, dir: &Path) -> ShellExecRequest {
        ShellExecRequest {
            command: command.to_string(),
            allow_shell: true,
            allowed_commands: vec![],
            workdir: dir.display().to_string(),
            timeout_ms: 10_000,
            max_output_chars: 10_000,
        }
    }

    #[tokio::test]
    async fn shell_exec_runs_argv_without_shell() {
        let dir = tempfile::tempdir().unwrap();
        let output = shell_exec(shell_request("echo hello world", dir.path()))
            .await
            .unwrap();
        assert_eq!(output.trim(), "hello world");
    }

    #[tokio::test]
    async fn shell_exec_denied_without_allow_shell() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = shell_request("echo x", dir.path());
        req.allow_shell = false;
        let err = shell_exec(req).await.unwrap_err();
        assert!(err.to_string().contains("allow_shell"));
    }

    #[tokio::test]
    async fn shell_exec_enforces_command_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = shell_request("echo x", dir.path());
        req.allowed_commands = vec!["ls".to_string()];
        let err = shell_exec(req).await.unwrap_err();
        assert!(err.to_string().contains("allowed_shell_commands"));

        let mut req = shell_request("echo fine", dir.path());
        req.allowed_commands = vec!["echo".to_string()];
        assert_eq!(shell_exec(req).await.unwrap().trim(), "fine");
    }

    #[tokio::test]
    async fn shell_exec_nonzero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = shell_exec(shell_request("false", dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code"));
    }

    #[tokio::test]
    async fn shell_exec_unterminated_quote_is_bad_args() {
        let dir = tempfile::tempdir().unwrap();
        let err = shell_exec(shell_request("echo 'oops", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreclawError::BadArgs(_)));
    }

    #[tokio::test]
    async fn fs_write_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let req = FsWriteRequest {
            workspace_dir: dir.path().display().to_string(),
            path: "notes/a.txt".to_string(),
            content: "one".to_string(),
            append: false,
        };
        fs_write(req.clone()).await.unwrap();
        fs_write(FsWriteRequest {
            content: "two".to_string(),
            append: true,
            ..req
        })
        .await
        .unwrap();

        let text = std::fs::read_to_string(dir.path().join("notes/a.txt")).unwrap();
        assert_eq!(text, "onetwo");
    }

    #[tokio::test]
    async fn fs_write_symlink_escape_is_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(outside.path(), dir.path().join("link-outside")).unwrap();
            let err = fs_write(FsWriteRequest {
                workspace_dir: dir.path().display().to_string(),
                path: "link-outside/new.txt".to_string(),
                content: "x".to_string(),
                append: false,
            })
            .await
            .unwrap_err();
            assert!(err.to_string().contains("outside workspace"));
        }
    }

    #[tokio::test]
    async fn web_fetch_returns_status_body_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abcdefghij"))
            .mount(&server)
            .await;

        // The mock server binds 127.0.0.1, which the policy rejects; this
        // test exercises the policy path rather than bypassing it.
        let req = WebFetchRequest {
            url: format!("{}/page", server.uri()),
            allowed_domains: vec![],
            allowed_ports: vec![],
            blocked_ports: vec![],
            max_response_chars: 4,
            timeout_ms: 5_000,
        };
        let err = web_fetch(req).await.unwrap_err();
        assert!(err.to_string().contains("private"));
    }

    #[tokio::test]
    async fn execute_maps_errors_to_failure_response() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = shell_request("echo x", dir.path());
        req.allow_shell = false;
        let response = execute(WorkerRequest::ShellExec(req)).await;
        assert!(!response.ok);
        assert!(response.error.unwrap().contains("allow_shell"));
    }

    #[test]
    fn request_round_trips_through_json() {
        let request = WorkerRequest::FsWrite(FsWriteRequest {
            workspace_dir: "/w".to_string(),
            path: "a.txt".to_string(),
            content: "hi".to_string(),
            append: false,
        });
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""tool":"fs.write""#));
        let back: WorkerRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, WorkerRequest::FsWrite(_)));
    }

    #[test]
    fn response_shapes() {
        let ok = serde_json::to_value(WorkerResponse::success("r".to_string())).unwrap();
        assert_eq!(ok, serde_json::json!({"ok": true, "result": "r"}));
        let err = serde_json::to_value(WorkerResponse::failure("e".to_string())).unwrap();
        assert_eq!(err, serde_json::json!({"ok": false, "error": "e"}));
    }
}
