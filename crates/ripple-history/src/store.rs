//! History store keyed by `(namespace, room)`.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::room::{HistoryEntry, HistoryError, HistoryLimits, HistoryStats, RoomHistory};

/// Default number of entries returned by a query.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// A history read request.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    /// Maximum number of entries returned.
    pub limit: usize,
    /// Keep only these event names, if set. Applied before the exclude
    /// filter.
    pub include_events: Option<HashSet<String>>,
    /// Drop these event names, if set.
    pub exclude_events: Option<HashSet<String>>,
    /// Fetch-time payload cap. Overrides the record-time cap for this
    /// call only, without mutating stored entries.
    pub payload_size_cap: Option<usize>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self::latest(DEFAULT_QUERY_LIMIT)
    }
}

impl HistoryQuery {
    /// Query for the `limit` most recent entries.
    #[must_use]
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            include_events: None,
            exclude_events: None,
            payload_size_cap: None,
        }
    }

    /// Keep only the given event names.
    #[must_use]
    pub fn include_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// Drop the given event names.
    #[must_use]
    pub fn exclude_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    /// Truncate returned payloads to `cap` characters.
    #[must_use]
    pub fn payload_size_cap(mut self, cap: usize) -> Self {
        self.payload_size_cap = Some(cap);
        self
    }
}

/// A partial settings update for one room's history.
#[derive(Debug, Clone, Default)]
pub struct Reconfigure {
    /// Turn recording on or off.
    pub enabled: Option<bool>,
    /// New ring buffer capacity.
    pub max_entries: Option<usize>,
    /// New retention window in seconds.
    pub retention_seconds: Option<f64>,
    /// New record-time payload cap.
    pub payload_size_cap: Option<usize>,
}

/// Message history for all rooms across all namespaces.
///
/// Buffers are created lazily on first [`enable`](Self::enable) or
/// [`configure`](Self::configure); recording into a room that was never
/// enabled is a no-op.
#[derive(Debug, Default)]
pub struct MessageHistoryStore {
    histories: DashMap<(String, String), RoomHistory>,
}

impl MessageHistoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable history for a room, creating the buffer on first use.
    ///
    /// Re-enabling an existing buffer clears it first and keeps its
    /// limits and eviction counters; use [`configure`](Self::configure)
    /// to change limits.
    ///
    /// # Errors
    ///
    /// Returns an error if `limits` are invalid.
    pub fn enable(
        &self,
        room: &str,
        namespace: &str,
        limits: HistoryLimits,
    ) -> Result<(), HistoryError> {
        limits.validate()?;
        match self.histories.entry(key(namespace, room)) {
            Entry::Vacant(slot) => {
                debug!(namespace, room, "History enabled");
                slot.insert(RoomHistory::new(limits)?);
            }
            Entry::Occupied(mut slot) => {
                let history = slot.get_mut();
                history.clear();
                history.enable();
            }
        }
        Ok(())
    }

    /// Disable recording for a room. No-op if the room has no buffer.
    pub fn disable(&self, room: &str, namespace: &str) {
        if let Some(mut history) = self.histories.get_mut(&key(namespace, room)) {
            history.disable();
        }
    }

    /// Apply a partial settings update, creating the buffer if absent.
    ///
    /// Flipping a disabled buffer back to enabled clears it first.
    ///
    /// # Errors
    ///
    /// Returns an error if any updated value is invalid.
    pub fn configure(
        &self,
        room: &str,
        namespace: &str,
        update: Reconfigure,
    ) -> Result<(), HistoryError> {
        match self.histories.entry(key(namespace, room)) {
            Entry::Vacant(slot) => {
                let limits = HistoryLimits {
                    max_entries: update.max_entries.unwrap_or(crate::room::DEFAULT_MAX_ENTRIES),
                    retention_seconds: update.retention_seconds,
                    payload_size_cap: update.payload_size_cap,
                };
                let mut history = RoomHistory::new(limits)?;
                if update.enabled == Some(false) {
                    history.disable();
                }
                slot.insert(history);
            }
            Entry::Occupied(mut slot) => {
                let history = slot.get_mut();
                if update.enabled == Some(true) && !history.is_enabled() {
                    history.clear();
                }
                history.reconfigure(&update)?;
            }
        }
        Ok(())
    }

    /// Drop all buffered entries for a room, keeping its settings and
    /// counters. No-op if the room has no buffer.
    pub fn clear(&self, room: &str, namespace: &str) {
        if let Some(mut history) = self.histories.get_mut(&key(namespace, room)) {
            history.clear();
        }
    }

    /// Record an emitted event. Best-effort: a room without an enabled
    /// buffer swallows the entry silently.
    pub fn record(&self, event: &str, data: &Value, namespace: &str, room: &str) {
        if let Some(mut history) = self.histories.get_mut(&key(namespace, room)) {
            history.record(event, data.clone(), unix_now());
        }
    }

    /// Query a room's history. Returns an empty list for rooms without a
    /// buffer.
    #[must_use]
    pub fn get(&self, room: &str, namespace: &str, query: &HistoryQuery) -> Vec<HistoryEntry> {
        match self.histories.get_mut(&key(namespace, room)) {
            Some(mut history) => history.entries(query, unix_now()),
            None => Vec::new(),
        }
    }

    /// Statistics for a room. Zeroes for rooms without a buffer.
    #[must_use]
    pub fn stats(&self, room: &str, namespace: &str) -> HistoryStats {
        self.histories
            .get(&key(namespace, room))
            .map(|h| h.stats())
            .unwrap_or_default()
    }
}

fn key(namespace: &str, room: &str) -> (String, String) {
    (namespace.to_string(), room.to_string())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_without_enable_is_noop() {
        let store = MessageHistoryStore::new();
        store.record("msg", &json!(1), "/", "lobby");

        assert!(store.get("lobby", "/", &HistoryQuery::default()).is_empty());
        assert_eq!(store.stats("lobby", "/"), HistoryStats::default());
    }

    #[test]
    fn test_enable_then_record_and_get() {
        let store = MessageHistoryStore::new();
        store.enable("lobby", "/", HistoryLimits::default()).unwrap();
        store.record("msg", &json!("hello"), "/", "lobby");

        let entries = store.get("lobby", "/", &HistoryQuery::default());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "msg");
        assert_eq!(entries[0].data, json!("hello"));
    }

    #[test]
    fn test_rooms_are_isolated_by_namespace() {
        let store = MessageHistoryStore::new();
        store.enable("lobby", "/", HistoryLimits::default()).unwrap();
        store.enable("lobby", "/chat", HistoryLimits::default()).unwrap();
        store.record("msg", &json!(1), "/", "lobby");

        assert_eq!(store.get("lobby", "/", &HistoryQuery::default()).len(), 1);
        assert!(store
            .get("lobby", "/chat", &HistoryQuery::default())
            .is_empty());
    }

    #[test]
    fn test_reenable_clears_buffer() {
        let store = MessageHistoryStore::new();
        store.enable("lobby", "/", HistoryLimits::default()).unwrap();
        store.record("msg", &json!(1), "/", "lobby");
        store.disable("lobby", "/");

        store.enable("lobby", "/", HistoryLimits::default()).unwrap();
        assert!(store.get("lobby", "/", &HistoryQuery::default()).is_empty());
    }

    #[test]
    fn test_configure_creates_lazily_and_validates() {
        let store = MessageHistoryStore::new();
        assert_eq!(
            store.configure(
                "lobby",
                "/",
                Reconfigure {
                    max_entries: Some(0),
                    ..Default::default()
                }
            ),
            Err(HistoryError::InvalidCapacity)
        );

        store
            .configure(
                "lobby",
                "/",
                Reconfigure {
                    max_entries: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        for i in 0..3 {
            store.record("msg", &json!(i), "/", "lobby");
        }
        assert_eq!(store.stats("lobby", "/").evictions_size, 1);
    }

    #[test]
    fn test_configure_reenable_clears_first() {
        let store = MessageHistoryStore::new();
        store.enable("lobby", "/", HistoryLimits::default()).unwrap();
        store.record("msg", &json!(1), "/", "lobby");
        store.disable("lobby", "/");

        store
            .configure(
                "lobby",
                "/",
                Reconfigure {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(store.get("lobby", "/", &HistoryQuery::default()).is_empty());
    }

    #[test]
    fn test_clear_keeps_counters() {
        let store = MessageHistoryStore::new();
        store
            .enable(
                "lobby",
                "/",
                HistoryLimits {
                    max_entries: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        store.record("a", &json!(1), "/", "lobby");
        store.record("b", &json!(2), "/", "lobby");
        store.clear("lobby", "/");

        let stats = store.stats("lobby", "/");
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.evictions_size, 1);
    }
}
