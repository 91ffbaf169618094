// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI channel: stdin lines in, stdout replies out.
//!
//! `/exit` ends the loop; `/dlq list` and `/dlq replay` drive the bus
//! dead-letter API and print JSON. Anything else becomes an inbound
//! envelope for the local operator chat.

use std::sync::Arc;

use async_trait::async_trait;
use coreclaw_bus::MessageBus;
use coreclaw_core::{BusPublisher, Channel, CoreclawError, Direction, Envelope};
use coreclaw_storage::{ReplaySelector, now_iso};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// Chat id used for the local stdin operator.
const CLI_CHAT_ID: &str = "local";

/// Outbound side of the CLI channel.
pub struct CliChannel;

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
        println!("{}", envelope.content);
        Ok(())
    }
}

/// Read stdin until EOF or `/exit`, publishing each line as inbound.
pub async fn run_stdin_loop(bus: Arc<MessageBus>) -> Result<(), CoreclawError> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line == "/exit" {
            break;
        }
        if let Some(rest) = line.strip_prefix("/dlq") {
            if let Err(err) = handle_dlq_command(&bus, rest.trim()).await {
                eprintln!("dlq command failed: {err}");
            }
            continue;
        }

        let envelope = Envelope {
            id: format!("cli:{}", uuid::Uuid::new_v4()),
            channel: "cli".to_string(),
            chat_id: CLI_CHAT_ID.to_string(),
            sender_id: Some("operator".to_string()),
            content: line,
            created_at: now_iso(),
            metadata: None,
        };
        if let Err(err) = bus.publish_inbound(envelope).await {
            warn!(error = %err, "failed to publish CLI inbound");
        }
    }
    Ok(())
}

/// `/dlq list [inbound|outbound|all] [limit]` and
/// `/dlq replay <queueId|inbound|outbound|all> [limit]`.
async fn handle_dlq_command(bus: &MessageBus, rest: &str) -> Result<(), CoreclawError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        ["list", args @ ..] => {
            let (direction, limit) = parse_list_args(args)?;
            let records = bus.list_dead_letter_messages(direction, limit).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&records).map_err(CoreclawError::storage)?
            );
            Ok(())
        }
        ["replay", target, args @ ..] => {
            let limit = parse_limit(args.first())?;
            let selector = match *target {
                "inbound" => ReplaySelector::ByDirection("inbound".to_string()),
                "outbound" => ReplaySelector::ByDirection("outbound".to_string()),
                "all" => ReplaySelector::All,
                id => ReplaySelector::ById(id.parse().map_err(|_| {
                    CoreclawError::BadArgs(format!(
                        "expected a queue id, inbound, outbound, or all, got {id:?}"
                    ))
                })?),
            };
            let replayed = bus.replay_dead_letter_messages(selector, limit).await?;
            println!("{}", serde_json::json!({"replayed": replayed}));
            Ok(())
        }
        _ => Err(CoreclawError::BadArgs(
            "usage: /dlq list [inbound|outbound|all] [limit] | /dlq replay <queueId|inbound|outbound|all> [limit]"
                .to_string(),
        )),
    }
}

fn parse_list_args(args: &[&str]) -> Result<(Option<Direction>, usize), CoreclawError> {
    match args {
        [] => Ok((None, 50)),
        [one] => {
            if let Ok(limit) = one.parse::<usize>() {
                Ok((None, limit))
            } else {
                Ok((parse_direction(one)?, 50))
            }
        }
        [direction, limit, ..] => Ok((parse_direction(direction)?, parse_limit(Some(limit))?)),
    }
}

fn parse_direction(text: &str) -> Result<Option<Direction>, CoreclawError> {
    match text {
        "all" => Ok(None),
        "inbound" => Ok(Some(Direction::Inbound)),
        "outbound" => Ok(Some(Direction::Outbound)),
        other => Err(CoreclawError::BadArgs(format!(
            "expected inbound, outbound, or all, got {other:?}"
        ))),
    }
}

fn parse_limit(text: Option<&&str>) -> Result<usize, CoreclawError> {
    match text {
        None => Ok(50),
        Some(text) => text.parse().map_err(|_| {
            CoreclawError::BadArgs(format!("expected a numeric limit, got {text:?}"))
        }),
    }
}
