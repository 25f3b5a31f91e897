//! In-process reference backend.
//!
//! A [`MemoryBroker`] fans every published message out to all attached
//! subscriptions over a `tokio::sync::broadcast` channel. Useful for
//! single-process deployments and for exercising a multi-coordinator
//! topology in tests without an external broker.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::warn;

use crate::backend::{Backend, BackendError, Subscription};

/// Default broadcast capacity per broker.
const DEFAULT_BROKER_CAPACITY: usize = 1024;

/// A shared in-process fanout hub. Clones refer to the same hub; hand
/// one clone to each coordinator's [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    channel: String,
    sender: broadcast::Sender<Bytes>,
}

impl MemoryBroker {
    /// Create a broker for the given channel name.
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_capacity(channel, DEFAULT_BROKER_CAPACITY)
    }

    /// Create a broker with a specific buffer capacity.
    #[must_use]
    pub fn with_capacity(channel: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            channel: channel.into(),
            sender,
        }
    }

    /// A backend handle attached to this broker.
    #[must_use]
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            broker: self.clone(),
        }
    }
}

/// Backend adapter over a [`MemoryBroker`].
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    broker: MemoryBroker,
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn channel(&self) -> &str {
        &self.broker.channel
    }

    async fn publish(&self, payload: Bytes) -> Result<(), BackendError> {
        self.broker
            .sender
            .send(payload)
            .map(|_| ())
            .map_err(|_| BackendError::Publish("no subscribers attached".to_string()))
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, BackendError> {
        Ok(Box::new(MemorySubscription {
            receiver: self.broker.sender.subscribe(),
        }))
    }
}

struct MemorySubscription {
    receiver: broadcast::Receiver<Bytes>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Bytes, BackendError> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Memory subscription lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BackendError::Connection("broker closed".to_string()));
                }
            }
        }
    }
}
