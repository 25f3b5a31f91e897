//! Per-room history ring buffer.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::store::{HistoryQuery, Reconfigure};

/// Default ring buffer capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 100;

/// History configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// Zero capacity.
    #[error("max_entries must be positive")]
    InvalidCapacity,

    /// Non-positive retention window.
    #[error("retention_seconds must be positive")]
    InvalidRetention,

    /// Zero payload size cap.
    #[error("payload_size_cap must be positive")]
    InvalidPayloadCap,
}

/// Limits applied to a room's history buffer.
#[derive(Debug, Clone)]
pub struct HistoryLimits {
    /// Ring buffer capacity.
    pub max_entries: usize,
    /// Maximum entry age in seconds, if bounded.
    pub retention_seconds: Option<f64>,
    /// Payload truncation applied at record time, if set.
    pub payload_size_cap: Option<usize>,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            retention_seconds: None,
            payload_size_cap: None,
        }
    }
}

impl HistoryLimits {
    /// Validate the limit values.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero capacity, a non-positive retention
    /// window, or a zero payload cap.
    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.max_entries == 0 {
            return Err(HistoryError::InvalidCapacity);
        }
        if matches!(self.retention_seconds, Some(r) if r <= 0.0) {
            return Err(HistoryError::InvalidRetention);
        }
        if self.payload_size_cap == Some(0) {
            return Err(HistoryError::InvalidPayloadCap);
        }
        Ok(())
    }
}

/// A single recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
    /// Seconds since the Unix epoch at record time.
    pub timestamp: f64,
}

/// History statistics for one room.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    /// Entries currently buffered.
    pub entries: usize,
    /// Cumulative entries dropped by the capacity bound.
    pub evictions_size: u64,
    /// Cumulative entries dropped by the retention bound.
    pub evictions_time: u64,
}

/// Replay buffer for a single `(namespace, room)` pair.
///
/// All time-dependent operations take an explicit `now` (seconds since the
/// Unix epoch); [`MessageHistoryStore`](crate::MessageHistoryStore)
/// supplies the wall clock.
#[derive(Debug)]
pub struct RoomHistory {
    limits: HistoryLimits,
    enabled: bool,
    buffer: VecDeque<HistoryEntry>,
    evictions_size: u64,
    evictions_time: u64,
}

impl RoomHistory {
    /// Create a new buffer with the given limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the limits are invalid.
    pub fn new(limits: HistoryLimits) -> Result<Self, HistoryError> {
        limits.validate()?;
        let capacity = limits.max_entries;
        Ok(Self {
            limits,
            enabled: true,
            buffer: VecDeque::with_capacity(capacity),
            evictions_size: 0,
            evictions_time: 0,
        })
    }

    /// Whether recording is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an entry, applying the record-time payload cap and both
    /// eviction bounds.
    pub fn record(&mut self, event: impl Into<String>, data: Value, now: f64) {
        if !self.enabled {
            return;
        }
        let data = match self.limits.payload_size_cap {
            Some(cap) => truncate_payload(&data, cap),
            None => data,
        };
        if self.buffer.len() == self.limits.max_entries {
            self.buffer.pop_front();
            self.evictions_size += 1;
        }
        self.buffer.push_back(HistoryEntry {
            event: event.into(),
            data,
            timestamp: now,
        });
        self.prune_expired(now);
    }

    /// Return up to `query.limit` most-recent entries after filtering.
    ///
    /// The include filter is applied before the exclude filter. A
    /// fetch-time payload cap applies to the returned clones only; stored
    /// entries are never mutated by a read.
    pub fn entries(&mut self, query: &HistoryQuery, now: f64) -> Vec<HistoryEntry> {
        if !self.enabled {
            return Vec::new();
        }
        self.prune_expired(now);

        let mut selected: Vec<&HistoryEntry> = self
            .buffer
            .iter()
            .filter(|e| match &query.include_events {
                Some(include) => include.contains(&e.event),
                None => true,
            })
            .filter(|e| match &query.exclude_events {
                Some(exclude) => !exclude.contains(&e.event),
                None => true,
            })
            .collect();

        if selected.len() > query.limit {
            selected.drain(..selected.len() - query.limit);
        }

        selected
            .into_iter()
            .map(|e| match query.payload_size_cap {
                Some(cap) => HistoryEntry {
                    event: e.event.clone(),
                    data: truncate_payload(&e.data, cap),
                    timestamp: e.timestamp,
                },
                None => e.clone(),
            })
            .collect()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            entries: self.buffer.len(),
            evictions_size: self.evictions_size,
            evictions_time: self.evictions_time,
        }
    }

    /// Enable recording.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disable recording. The buffer and counters are retained.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Drop all buffered entries, keeping the eviction counters.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Apply a partial reconfiguration.
    ///
    /// Shrinking `max_entries` below the current length evicts the oldest
    /// overflow and counts it as size evictions.
    ///
    /// # Errors
    ///
    /// Returns an error if any updated value is invalid; no field is
    /// changed in that case.
    pub fn reconfigure(&mut self, update: &Reconfigure) -> Result<(), HistoryError> {
        let mut limits = self.limits.clone();
        if let Some(max_entries) = update.max_entries {
            limits.max_entries = max_entries;
        }
        if let Some(retention) = update.retention_seconds {
            limits.retention_seconds = Some(retention);
        }
        if let Some(cap) = update.payload_size_cap {
            limits.payload_size_cap = Some(cap);
        }
        limits.validate()?;

        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        while self.buffer.len() > limits.max_entries {
            self.buffer.pop_front();
            self.evictions_size += 1;
        }
        self.limits = limits;
        Ok(())
    }

    fn prune_expired(&mut self, now: f64) {
        let Some(retention) = self.limits.retention_seconds else {
            return;
        };
        let cutoff = now - retention;
        while matches!(self.buffer.front(), Some(e) if e.timestamp < cutoff) {
            self.buffer.pop_front();
            self.evictions_time += 1;
        }
        trace!(entries = self.buffer.len(), "Pruned expired history entries");
    }
}

/// Truncate string payloads to `cap` characters, recursing through arrays
/// and objects. Other value kinds pass through unchanged.
#[must_use]
pub fn truncate_payload(data: &Value, cap: usize) -> Value {
    match data {
        Value::String(s) => Value::String(s.chars().take(cap).collect()),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| truncate_payload(v, cap)).collect())
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), truncate_payload(v, cap)))
                .collect(),
        ),
        other => other.clone(),
    }
}
