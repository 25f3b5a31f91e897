//! Acknowledgement callback registry.
//!
//! Every emit that requests an acknowledgement gets an id that travels to
//! the client inside the event packet; the client echoes it back and the
//! stored callback fires exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

/// A one-shot acknowledgement callback. Invoked with the arguments the
/// client attached to its acknowledgement.
pub type AckCallback = Arc<dyn Fn(Value) + Send + Sync + 'static>;

#[derive(Default)]
struct AckSlot {
    last_id: u64,
    callbacks: HashMap<u64, AckCallback>,
}

/// Callback registry keyed by `(sid, namespace)`.
///
/// Ids are monotonically increasing per key. An entry is removed on its
/// first trigger, or when the owning session disconnects.
#[derive(Default)]
pub struct AckRegistry {
    slots: DashMap<(String, String), AckSlot>,
}

impl AckRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id for `(sid, namespace)` and store the callback
    /// under it.
    pub fn generate(&self, sid: &str, namespace: &str, callback: AckCallback) -> u64 {
        let mut slot = self
            .slots
            .entry((sid.to_string(), namespace.to_string()))
            .or_default();
        slot.last_id += 1;
        let id = slot.last_id;
        slot.callbacks.insert(id, callback);
        id
    }

    /// Invoke and remove the callback stored under `(sid, namespace, id)`.
    ///
    /// An unknown combination is ignored with a warning: the callback may
    /// already have fired, or the session may have disconnected while the
    /// acknowledgement was in flight.
    pub fn trigger(&self, sid: &str, namespace: &str, id: u64, args: Value) {
        let callback = self
            .slots
            .get_mut(&(sid.to_string(), namespace.to_string()))
            .and_then(|mut slot| slot.callbacks.remove(&id));
        match callback {
            Some(callback) => {
                debug!(sid = %sid, namespace = %namespace, id, "Triggering ack callback");
                callback(args);
            }
            None => {
                warn!(sid = %sid, namespace = %namespace, id, "Unknown ack callback, ignoring");
            }
        }
    }

    /// Remove every outstanding callback for `(sid, namespace)`.
    pub fn purge(&self, sid: &str, namespace: &str) {
        self.slots.remove(&(sid.to_string(), namespace.to_string()));
    }

    /// Number of callbacks outstanding for `(sid, namespace)`.
    #[must_use]
    pub fn pending(&self, sid: &str, namespace: &str) -> usize {
        self.slots
            .get(&(sid.to_string(), namespace.to_string()))
            .map(|slot| slot.callbacks.len())
            .unwrap_or(0)
    }
}
