//! Session outboxes.
//!
//! The registry is the façade's side of the delivery seam: the core
//! resolves *who* gets an event, and the registry queues it on that
//! session's outbox for the transport layer to drain.

use dashmap::DashMap;
use ripple_core::Delivery;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// An event queued for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    /// Event name.
    pub event: String,
    /// Event payload.
    pub data: Value,
    /// Namespace the event was emitted on.
    pub namespace: String,
    /// Acknowledgement id the client should echo back, if any.
    pub ack_id: Option<u64>,
}

/// Outbox registry keyed by `(namespace, sid)`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    outboxes: DashMap<(String, String), mpsc::UnboundedSender<OutboundEvent>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an outbox for a session, replacing any previous one.
    pub fn open(&self, sid: &str, namespace: &str) -> mpsc::UnboundedReceiver<OutboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes
            .insert((namespace.to_string(), sid.to_string()), tx);
        rx
    }

    /// Drop a session's outbox.
    pub fn close(&self, sid: &str, namespace: &str) {
        self.outboxes
            .remove(&(namespace.to_string(), sid.to_string()));
    }

    /// Number of open outboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    /// Whether no outboxes are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }
}

impl Delivery for SessionRegistry {
    fn deliver(&self, sid: &str, event: &str, data: &Value, namespace: &str, ack_id: Option<u64>) {
        let Some(outbox) = self
            .outboxes
            .get(&(namespace.to_string(), sid.to_string()))
        else {
            // Membership can outlive the transport connection briefly.
            debug!(sid = %sid, namespace = %namespace, "No outbox for session, dropping event");
            return;
        };
        let queued = outbox.send(OutboundEvent {
            event: event.to_string(),
            data: data.clone(),
            namespace: namespace.to_string(),
            ack_id,
        });
        if queued.is_err() {
            warn!(sid = %sid, namespace = %namespace, "Outbox receiver gone, dropping event");
        }
    }
}
