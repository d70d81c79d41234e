//! Exactly-once classification of incoming chat messages.
//!
//! The server's activity feed is fetched in overlapping windows, so the same
//! message can show up in several polls. A per-device cursor ordered by
//! `(created_at, id)` (creation order, not wall clock, since server
//! timestamps can collide) marks everything already processed. The cursor
//! advances over every message seen, including ones never emitted (wrong
//! sender), so a transient downstream error cannot cause a replay storm.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::models::ChatMessage;

/// Per-device watermark: the newest message already processed.
///
/// Ordered by creation time first, message id second. Serializable so the
/// host can persist cursors alongside the session and resume without
/// re-emitting old messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl MessageCursor {
    fn for_message(message: &ChatMessage) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id.clone(),
        }
    }
}

/// Tracks the highest-seen message cursor per device and filters raw
/// activity down to *new* watch-originated messages.
#[derive(Debug, Default)]
pub struct MessageDeduplicator {
    cursors: HashMap<String, MessageCursor>,
}

impl MessageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore cursors persisted by the host.
    pub fn restore(cursors: HashMap<String, MessageCursor>) -> Self {
        Self { cursors }
    }

    /// Classify a device's batch of messages into the not-yet-seen,
    /// watch-originated subset, in ascending creation order.
    ///
    /// For any fixed sequence of feeds, even overlapping or re-fetched
    /// windows, each message id comes back from here at most once over the
    /// lifetime of the device's cursor.
    pub fn classify(&mut self, device_id: &str, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut ordered: Vec<&ChatMessage> = messages.iter().collect();
        ordered.sort_by(|a, b| {
            (a.created_at, a.id.as_str()).cmp(&(b.created_at, b.id.as_str()))
        });

        let cursor = self.cursors.get(device_id).cloned();
        let mut max_seen = cursor.clone();
        let mut fresh = Vec::new();

        for message in ordered {
            let key = MessageCursor::for_message(message);
            let already_seen = cursor.as_ref().map_or(false, |c| key <= *c);
            if !already_seen && message.sender.is_watch_originated() {
                fresh.push(message.clone());
            }
            if max_seen.as_ref().map_or(true, |m| key > *m) {
                max_seen = Some(key);
            }
        }

        if let Some(cursor) = max_seen {
            self.cursors.insert(device_id.to_string(), cursor);
        }
        fresh
    }

    /// Forget a device's cursor. Called when the device leaves the account;
    /// a re-added device starts from scratch.
    pub fn reset_device(&mut self, device_id: &str) {
        self.cursors.remove(device_id);
    }

    /// Drop cursors for every device not in the live set.
    pub fn retain_devices<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.cursors.retain(|device_id, _| keep(device_id));
    }

    /// Current cursor for a device, if any.
    pub fn cursor(&self, device_id: &str) -> Option<&MessageCursor> {
        self.cursors.get(device_id)
    }

    /// Snapshot of every cursor, for persistence by the host.
    pub fn export(&self) -> HashMap<String, MessageCursor> {
        self.cursors.clone()
    }
}
