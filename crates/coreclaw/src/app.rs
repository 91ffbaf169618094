// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The application aggregate.
//!
//! Construction order breaks the cyclic wiring: storage first, then the
//! bus, then the registry and runtime, then the router holding both.
//! Tools only ever see a [`ToolContext`] with the bus's publish surface.
//! Shutdown tears everything down in reverse order and drains in-flight
//! handlers up to the processing deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use coreclaw_agent::AgentRuntime;
use coreclaw_bus::MessageBus;
use coreclaw_config::{CoreclawConfig, validate};
use coreclaw_context::ContextBuilder;
use coreclaw_core::{BusPublisher, CoreclawError, Provider};
use coreclaw_gateway::{Outbox, WebhookChannel, WebhookState};
use coreclaw_heartbeat::HeartbeatSource;
use coreclaw_isolation::IsolatedToolRuntime;
use coreclaw_observability::{Metrics, ObservabilityState, SloWatcher};
use coreclaw_provider::HttpProvider;
use coreclaw_router::{ChannelMux, ConversationRouter};
use coreclaw_scheduler::Scheduler;
use coreclaw_storage::Storage;
use coreclaw_tools::{ToolRegistry, register_builtin_tools};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::cli::CliChannel;

/// Owns every long-lived component of the runtime.
pub struct CoreclawApp {
    pub config: Arc<CoreclawConfig>,
    pub storage: Arc<Storage>,
    pub bus: Arc<MessageBus>,
    pub metrics: Arc<Metrics>,
    scheduler: Arc<Scheduler>,
    heartbeat: Arc<HeartbeatSource>,
    slo: Arc<SloWatcher>,
    ready: Arc<AtomicBool>,
    server_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    slo_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for CoreclawApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreclawApp").finish_non_exhaustive()
    }
}

impl CoreclawApp {
    /// Validate config, open storage, wire every component, and start the
    /// background loops.
    pub async fn start(config: CoreclawConfig) -> Result<Arc<Self>, CoreclawError> {
        validate(&config)?;
        let config = Arc::new(config);

        prepare_workspace(&config)?;
        let storage = Arc::new(
            Storage::open(&config.sqlite_path(), &config.backup_dir()).await?,
        );

        let metrics = Arc::new(Metrics::new());
        let bus = MessageBus::new(Arc::clone(&storage), config.bus.clone());
        let publisher: Arc<dyn BusPublisher> = bus.clone();

        let isolation = if config.isolation.enabled {
            Some(Arc::new(IsolatedToolRuntime::new(
                config.isolation.clone(),
                config.allowed_env.clone(),
                config.command_timeout_ms,
                IsolatedToolRuntime::self_worker_command(),
            )))
        } else {
            None
        };

        let mut registry = ToolRegistry::new(Some(Arc::clone(&metrics)));
        register_builtin_tools(&mut registry);
        let registry = Arc::new(registry);

        let provider: Arc<dyn Provider> = Arc::new(HttpProvider::new(config.provider.clone())?);
        let agent = Arc::new(AgentRuntime::new(
            Arc::clone(&provider),
            config.provider.model.clone(),
            config.provider.temperature,
            config.max_tool_iterations,
        ));
        let context_builder = Arc::new(ContextBuilder::new(
            PathBuf::from(&config.workspace_dir),
            config.history_max_messages,
            config.provider.max_input_tokens,
            config.provider.reserve_output_tokens,
        ));
        let heartbeat = HeartbeatSource::new(
            config.heartbeat.clone(),
            PathBuf::from(&config.workspace_dir),
            Arc::clone(&storage),
            Arc::clone(&publisher),
        );

        let router = ConversationRouter::new(
            Arc::clone(&storage),
            Arc::clone(&publisher),
            Arc::clone(&registry),
            agent,
            context_builder,
            Arc::clone(&heartbeat),
            Arc::clone(&provider),
            Arc::clone(&config),
            isolation,
        );
        bus.register_inbound_handler(router).await;

        // Outbound channels.
        let outbox = Arc::new(Outbox::new(
            config.webhook.outbox_max_per_chat,
            config.webhook.outbox_max_chats,
            config.webhook.outbox_chat_ttl_ms,
        ));
        let mut mux = ChannelMux::new();
        mux.register(Arc::new(CliChannel));
        mux.register(Arc::new(WebhookChannel::new(Arc::clone(&outbox))));
        bus.register_outbound_handler(Arc::new(mux)).await;

        let scheduler = Scheduler::new(
            Arc::clone(&storage),
            Arc::clone(&publisher),
            Arc::clone(&metrics),
            config.scheduler.tick_ms,
        );
        let slo = SloWatcher::new(config.slo.clone(), Arc::clone(&metrics), bus.clone());

        let app = Arc::new(Self {
            config: Arc::clone(&config),
            storage,
            bus,
            metrics,
            scheduler,
            heartbeat,
            slo,
            ready: Arc::new(AtomicBool::new(false)),
            server_tasks: Mutex::new(Vec::new()),
            slo_task: Mutex::new(None),
        });

        app.bus.start().await?;
        app.scheduler.start().await;
        app.heartbeat.start().await;
        *app.slo_task.lock().await = Some(app.slo.start());

        let mut server_tasks = app.server_tasks.lock().await;
        if config.webhook.enabled {
            let webhook_config = config.webhook.clone();
            let state = WebhookState {
                publisher: Arc::clone(&app.bus) as Arc<dyn BusPublisher>,
                outbox,
                auth_token: config.webhook.auth_token.clone(),
            };
            server_tasks.push(tokio::spawn(async move {
                if let Err(err) = coreclaw_gateway::serve(&webhook_config, state).await {
                    warn!(error = %err, "webhook server exited");
                }
            }));
        }
        if config.observability.enabled {
            let host = config.observability.host.clone();
            let port = config.observability.port;
            let state = ObservabilityState {
                watcher: Arc::clone(&app.slo),
                ready: Arc::clone(&app.ready),
            };
            server_tasks.push(tokio::spawn(async move {
                if let Err(err) = coreclaw_observability::serve(&host, port, state).await {
                    warn!(error = %err, "observability listener exited");
                }
            }));
        }
        drop(server_tasks);

        app.ready.store(true, Ordering::SeqCst);
        info!("coreclaw started");
        Ok(app)
    }

    /// Tear everything down in reverse construction order. Idempotent.
    pub async fn stop(&self) {
        self.ready.store(false, Ordering::SeqCst);

        for task in self.server_tasks.lock().await.drain(..) {
            task.abort();
        }
        self.slo.stop();
        if let Some(task) = self.slo_task.lock().await.take() {
            let _ = task.await;
        }
        self.heartbeat.stop().await;
        self.scheduler.stop().await;
        self.bus.stop().await;
        if let Err(err) = self.storage.close().await {
            warn!(error = %err, "storage close failed");
        }
        info!("coreclaw stopped");
    }
}

/// Create the workspace skeleton the prompt builder and tools expect.
fn prepare_workspace(config: &CoreclawConfig) -> Result<(), CoreclawError> {
    let workspace = PathBuf::from(&config.workspace_dir);
    for dir in [workspace.clone(), workspace.join("memory"), workspace.join("skills")] {
        std::fs::create_dir_all(&dir).map_err(CoreclawError::storage)?;
    }
    Ok(())
}
