// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory outbox for the webhook channel.
//!
//! Outbound replies wait here until the caller polls them off. Retention
//! is bounded three ways: per-chat entry cap, total chat cap, and a TTL on
//! idle chats.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::Serialize;

/// One deliverable reply.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub id: String,
    pub content: String,
    pub created_at: String,
}

struct ChatBox {
    entries: VecDeque<OutboxEntry>,
    last_touched_ms: i64,
}

/// Bounded per-chat reply queues.
pub struct Outbox {
    chats: DashMap<String, ChatBox>,
    max_per_chat: usize,
    max_chats: usize,
    chat_ttl_ms: u64,
}

impl Outbox {
    pub fn new(max_per_chat: usize, max_chats: usize, chat_ttl_ms: u64) -> Self {
        Self {
            chats: DashMap::new(),
            max_per_chat,
            max_chats,
            chat_ttl_ms,
        }
    }

    /// Queue one reply for a chat, evicting the oldest entry past the
    /// per-chat cap.
    pub fn push(&self, chat_id: &str, entry: OutboxEntry, now_ms: i64) {
        self.prune(now_ms);
        let mut chat = self.chats.entry(chat_id.to_string()).or_insert_with(|| ChatBox {
            entries: VecDeque::new(),
            last_touched_ms: now_ms,
        });
        chat.last_touched_ms = now_ms;
        chat.entries.push_back(entry);
        while chat.entries.len() > self.max_per_chat {
            chat.entries.pop_front();
        }
    }

    /// Remove and return up to `limit` entries for a chat, oldest first.
    pub fn drain(&self, chat_id: &str, limit: usize, now_ms: i64) -> Vec<OutboxEntry> {
        self.prune(now_ms);
        let Some(mut chat) = self.chats.get_mut(chat_id) else {
            return Vec::new();
        };
        chat.last_touched_ms = now_ms;
        let take = limit.min(chat.entries.len());
        chat.entries.drain(..take).collect()
    }

    /// Drop idle chats past the TTL, then the oldest chats past the count
    /// cap.
    fn prune(&self, now_ms: i64) {
        let ttl = self.chat_ttl_ms as i64;
        self.chats
            .retain(|_, chat| now_ms - chat.last_touched_ms <= ttl);

        while self.chats.len() > self.max_chats {
            let oldest = self
                .chats
                .iter()
                .min_by_key(|entry| entry.value().last_touched_ms)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.chats.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }
}
