// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: real storage, real bus, real router, with the model
//! provider mocked at the HTTP layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coreclaw::CoreclawApp;
use coreclaw_bus::BusHandler;
use coreclaw_config::CoreclawConfig;
use coreclaw_core::{BusPublisher, CoreclawError, Direction, Envelope};
use coreclaw_storage::now_iso;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reply_body(content: &str) -> serde_json::Value {
    serde_json::json!({"choices": [{"message": {"content": content}}]})
}

fn test_config(dir: &std::path::Path, provider_url: &str) -> CoreclawConfig {
    let mut config = CoreclawConfig {
        workspace_dir: dir.join("workspace").display().to_string(),
        data_dir: dir.join("data").display().to_string(),
        store_full_messages: true,
        ..CoreclawConfig::default()
    };
    config.provider.base_url = provider_url.to_string();
    config.provider.timeout_ms = 10_000;
    config.bus.poll_ms = 20;
    config.bus.retry_backoff_ms = 0;
    config.bus.max_retry_backoff_ms = 0;
    config.isolation.enabled = false;
    config
}

fn inbound(id: &str, content: &str) -> Envelope {
    Envelope {
        id: id.to_string(),
        channel: "cli".to_string(),
        chat_id: "e2e".to_string(),
        sender_id: Some("tester".to_string()),
        content: content.to_string(),
        created_at: now_iso(),
        metadata: None,
    }
}

/// Wait until the inbound queue settles (no pending/processing) or panic.
async fn wait_for_quiet(app: &CoreclawApp) {
    for _ in 0..300 {
        let (in_pending, in_processing, _) = app
            .bus
            .status_counts(Direction::Inbound)
            .await
            .unwrap();
        let (out_pending, out_processing, _) = app
            .bus
            .status_counts(Direction::Outbound)
            .await
            .unwrap();
        if in_pending + in_processing + out_pending + out_processing == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("queues never settled");
}

/// Handler that fails its first `fail_times` invocations; registered after
/// the router, it simulates a crash between router completion and bus ack.
struct ChaosHandler {
    calls: AtomicU32,
    fail_times: u32,
}

#[async_trait]
impl BusHandler for ChaosHandler {
    async fn handle(&self, _envelope: &Envelope) -> Result<(), CoreclawError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_times {
            Err(CoreclawError::Handler("chaos".to_string()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn full_turn_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("the answer")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = CoreclawApp::start(test_config(dir.path(), &server.uri())).await.unwrap();

    app.bus.publish_inbound(inbound("e2e-1", "a question")).await.unwrap();
    wait_for_quiet(&app).await;

    let chat = app.storage.get_or_create_chat("cli", "e2e").await.unwrap();
    assert_eq!(app.storage.message_count_by_role(chat.id, "user").await.unwrap(), 1);
    assert_eq!(
        app.storage.message_count_by_role(chat.id, "assistant").await.unwrap(),
        1
    );

    let execution = app.storage.execution("e2e-1").await.unwrap().unwrap();
    assert_eq!(execution.status, "completed");
    assert_eq!(execution.result_content.as_deref(), Some("the answer"));

    assert_eq!(
        execution.outbound_id.as_deref(),
        Some("outbound:cli:e2e:e2e-1")
    );
    let dead = app.bus.list_dead_letter_messages(None, 10).await.unwrap();
    assert!(dead.is_empty());

    app.stop().await;
}

#[tokio::test]
async fn duplicate_publish_handles_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("once")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = CoreclawApp::start(test_config(dir.path(), &server.uri())).await.unwrap();

    let envelope = inbound("X", "dup test");
    assert!(app.bus.publish_inbound(envelope.clone()).await.unwrap().is_some());
    assert!(app.bus.publish_inbound(envelope).await.unwrap().is_none());
    wait_for_quiet(&app).await;

    let chat = app.storage.get_or_create_chat("cli", "e2e").await.unwrap();
    assert_eq!(
        app.storage.message_count_by_role(chat.id, "assistant").await.unwrap(),
        1
    );
    let (pending, processing, dead) = app.bus.status_counts(Direction::Inbound).await.unwrap();
    assert_eq!((pending, processing, dead), (0, 0, 0));

    app.stop().await;
}

#[tokio::test]
async fn provider_retry_then_succeed() {
    let server = MockServer::start().await;
    // First call fails at the HTTP layer; the bus retries the turn.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("flaky"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("recovered")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = CoreclawApp::start(test_config(dir.path(), &server.uri())).await.unwrap();

    app.bus.publish_inbound(inbound("retry-1", "q")).await.unwrap();
    wait_for_quiet(&app).await;

    let execution = app.storage.execution("retry-1").await.unwrap().unwrap();
    assert_eq!(execution.status, "completed");
    assert_eq!(execution.result_content.as_deref(), Some("recovered"));
    assert!(app.bus.list_dead_letter_messages(None, 10).await.unwrap().is_empty());

    app.stop().await;
}

#[tokio::test]
async fn permanent_provider_failure_dead_letters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("always down"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &server.uri());
    config.bus.max_attempts = 2;
    let app = CoreclawApp::start(config).await.unwrap();

    app.bus.publish_inbound(inbound("doomed", "q")).await.unwrap();

    // Wait for the record to land in dead_letter.
    for _ in 0..300 {
        let (_, _, dead) = app.bus.status_counts(Direction::Inbound).await.unwrap();
        if dead == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let dead = app
        .bus
        .list_dead_letter_messages(Some(Direction::Inbound), 10)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].last_error.as_deref().unwrap().contains("500"));

    // No silent drop: replay brings it back once the provider recovers.
    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("finally")))
        .mount(&server)
        .await;
    app.bus
        .replay_dead_letter_messages(coreclaw_storage::ReplaySelector::All, 10)
        .await
        .unwrap();
    wait_for_quiet(&app).await;
    let execution = app.storage.execution("doomed").await.unwrap().unwrap();
    assert_eq!(execution.status, "completed");

    app.stop().await;
}

#[tokio::test]
async fn post_router_crash_does_not_reinvoke_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("only once")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let app = CoreclawApp::start(test_config(dir.path(), &server.uri())).await.unwrap();

    // Fails AFTER the router handler succeeded: the record retries even
    // though the turn completed.
    let chaos = Arc::new(ChaosHandler {
        calls: AtomicU32::new(0),
        fail_times: 1,
    });
    app.bus.register_inbound_handler(chaos.clone()).await;

    app.bus.publish_inbound(inbound("crash-1", "q")).await.unwrap();
    wait_for_quiet(&app).await;

    assert_eq!(chaos.calls.load(Ordering::SeqCst), 2, "bus retried the record");

    // Exactly one assistant message and one completed execution; the mock's
    // expect(1) verifies the model ran once.
    let chat = app.storage.get_or_create_chat("cli", "e2e").await.unwrap();
    assert_eq!(
        app.storage.message_count_by_role(chat.id, "assistant").await.unwrap(),
        1
    );
    let execution = app.storage.execution("crash-1").await.unwrap().unwrap();
    assert_eq!(execution.status, "completed");

    app.stop().await;
}

#[tokio::test]
async fn scheduler_chaos_fires_task_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("scheduled-chaos-ok")))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &server.uri());
    config.scheduler.tick_ms = 30;
    let app = CoreclawApp::start(config).await.unwrap();

    let chaos = Arc::new(ChaosHandler {
        calls: AtomicU32::new(0),
        fail_times: 1,
    });
    app.bus.register_inbound_handler(chaos.clone()).await;

    let chat = app.storage.get_or_create_chat("cli", "e2e").await.unwrap();
    let task_id = app
        .storage
        .create_task(
            chat.id,
            "run the chaos check",
            "once",
            "0",
            "group",
            Some(coreclaw_storage::now_ms() - 1),
            coreclaw_storage::now_ms(),
        )
        .await
        .unwrap();

    // Wait for the task to fire and the queues to settle.
    for _ in 0..300 {
        if chaos.calls.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    wait_for_quiet(&app).await;

    let runs = app.storage.task_runs(task_id).await.unwrap();
    assert_eq!(runs.len(), 1, "exactly one task run");
    assert_eq!(runs[0].status, "success");

    let task = app.storage.task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, "done");

    let execution = app.storage.execution(&runs[0].envelope_id).await.unwrap().unwrap();
    assert_eq!(execution.result_content.as_deref(), Some("scheduled-chaos-ok"));

    app.stop().await;
}

#[tokio::test]
async fn queue_overflow_dead_letters_at_capacity() {
    let server = MockServer::start().await;
    // No mock mounted: nothing should reach the provider.

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &server.uri());
    config.bus.max_pending_inbound = 2;
    config.bus.poll_ms = 60_000; // keep records pending during the test
    let app = CoreclawApp::start(config).await.unwrap();

    app.bus.publish_inbound(inbound("q1", "a")).await.unwrap();
    app.bus.publish_inbound(inbound("q2", "b")).await.unwrap();
    app.bus.publish_inbound(inbound("q3", "c")).await.unwrap();

    let dead = app
        .bus
        .list_dead_letter_messages(Some(Direction::Inbound), 10)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("Queue overflow"));

    app.stop().await;
}

#[tokio::test]
async fn per_chat_rate_limit_dead_letters() {
    let server = MockServer::start().await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &server.uri());
    config.bus.per_chat_rate_limit_max = 2;
    config.bus.per_chat_rate_limit_window_ms = 60_000;
    config.bus.poll_ms = 60_000;
    let app = CoreclawApp::start(config).await.unwrap();

    app.bus.publish_inbound(inbound("r1", "a")).await.unwrap();
    app.bus.publish_inbound(inbound("r2", "b")).await.unwrap();
    app.bus.publish_inbound(inbound("r3", "c")).await.unwrap();

    let dead = app
        .bus
        .list_dead_letter_messages(Some(Direction::Inbound), 10)
        .await
        .unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].last_error.as_deref(), Some("Rate limit exceeded"));

    app.stop().await;
}

#[tokio::test]
async fn restart_recovers_and_completes_without_second_model_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply_body("survived")))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), &server.uri());

    // First life: process a turn, then stop.
    let app = CoreclawApp::start(config.clone()).await.unwrap();
    app.bus.publish_inbound(inbound("restart-1", "hello")).await.unwrap();
    wait_for_quiet(&app).await;
    app.stop().await;

    // Second life over the same database: re-publishing the same envelope
    // is a dedupe no-op, and the ledger still remembers the result.
    let app = CoreclawApp::start(config).await.unwrap();
    assert!(
        app.bus
            .publish_inbound(inbound("restart-1", "hello"))
            .await
            .unwrap()
            .is_none()
    );
    let execution = app.storage.execution("restart-1").await.unwrap().unwrap();
    assert_eq!(execution.status, "completed");
    assert_eq!(execution.result_content.as_deref(), Some("survived"));

    app.stop().await;
}
