//! # ripple-history
//!
//! Bounded, evictable message history for the Ripple realtime engine.
//!
//! Each `(namespace, room)` pair can carry an independent replay buffer
//! that is populated as a side effect of successful emits and queried on
//! demand, typically to catch up a late joiner. Buffers are bounded two
//! ways:
//!
//! - **Capacity** - a ring buffer drops the oldest entry once
//!   `max_entries` is reached.
//! - **Retention** - entries older than `retention_seconds` are pruned on
//!   every write and read.
//!
//! Both kinds of eviction are counted and always queryable through
//! [`HistoryStats`]. Recording is best-effort instrumentation: it never
//! reports an error to the emit path.

pub mod room;
pub mod store;

pub use room::{HistoryEntry, HistoryError, HistoryLimits, HistoryStats, RoomHistory};
pub use store::{HistoryQuery, MessageHistoryStore, Reconfigure};
