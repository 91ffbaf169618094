// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound channel multiplexer.
//!
//! The bus's outbound handler: looks up the channel named in the envelope
//! and hands the record to its `send`. Unknown channels are an error so
//! the record retries and eventually dead-letters visibly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coreclaw_bus::BusHandler;
use coreclaw_core::{Channel, CoreclawError, Envelope};
use tracing::debug;

/// Routes outbound envelopes to their channel by name.
#[derive(Default)]
pub struct ChannelMux {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelMux {
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }
}

#[async_trait]
impl BusHandler for ChannelMux {
    async fn handle(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
        let channel = self.channels.get(&envelope.channel).ok_or_else(|| {
            CoreclawError::Channel {
                message: format!("no channel registered for {:?}", envelope.channel),
                source: None,
            }
        })?;
        channel.send(envelope).await?;
        debug!(channel = %envelope.channel, id = %envelope.id, "outbound delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingChannel {
        name: String,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, envelope: &Envelope) -> Result<(), CoreclawError> {
            self.sent.lock().unwrap().push(envelope.content.clone());
            Ok(())
        }
    }

    fn envelope(channel: &str) -> Envelope {
        Envelope {
            id: "o1".to_string(),
            channel: channel.to_string(),
            chat_id: "c1".to_string(),
            sender_id: None,
            content: "payload".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn routes_to_named_channel() {
        let cli = Arc::new(RecordingChannel {
            name: "cli".to_string(),
            sent: Mutex::new(Vec::new()),
        });
        let mut mux = ChannelMux::new();
        mux.register(cli.clone());

        mux.handle(&envelope("cli")).await.unwrap();
        assert_eq!(cli.sent.lock().unwrap().as_slice(), ["payload"]);
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let mux = ChannelMux::new();
        let err = mux.handle(&envelope("webhook")).await.unwrap_err();
        assert!(err.to_string().contains("no channel registered"));
    }
}
