// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Coreclaw - a single-host chat-agent runtime with a durable message bus.
//!
//! This is the binary entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use coreclaw::app::CoreclawApp;
use coreclaw::cli;
use tracing::{error, info};

/// Coreclaw - a durable chat-agent runtime.
#[derive(Parser, Debug)]
#[command(name = "coreclaw", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file. Defaults to ./coreclaw.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the runtime with the CLI channel attached to stdin.
    Serve,
    /// Internal: isolated-tool worker (stdio JSON protocol).
    #[command(hide = true)]
    Worker,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Worker => {
            // The worker speaks JSON on stdout; logs would corrupt the
            // protocol, so tracing stays uninitialized here.
            let code = coreclaw_isolation::run_worker().await;
            std::process::exit(code);
        }
        Commands::Serve => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "info".into()),
                )
                .with_writer(std::io::stderr)
                .init();

            if let Err(err) = serve(cli.config).await {
                error!(error = %err, "fatal");
                std::process::exit(1);
            }
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), coreclaw_core::CoreclawError> {
    let config = match config_path {
        Some(path) => coreclaw_config::load_config_from_path(&path),
        None => coreclaw_config::load_config(),
    }
    .map_err(|e| coreclaw_core::CoreclawError::Config(e.to_string()))?;

    let app = CoreclawApp::start(config).await?;
    info!("type a message; /exit quits, /dlq manages dead letters");

    let bus = Arc::clone(&app.bus);
    let stdin_loop = tokio::spawn(cli::run_stdin_loop(bus));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        result = stdin_loop => {
            match result {
                Ok(Ok(())) => info!("stdin closed, shutting down"),
                Ok(Err(err)) => error!(error = %err, "stdin loop failed"),
                Err(err) => error!(error = %err, "stdin task panicked"),
            }
        }
    }

    app.stop().await;
    Ok(())
}
