//! Pub/sub backend capability.
//!
//! The coordinator depends only on this small interface; concrete drivers
//! (a durable queue, a fanout exchange, the in-process broker) implement
//! it per backend technology.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Backend errors. All variants are treated as transient: publishes are
/// retried once and listeners resubscribe with backoff.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A publish was not accepted.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// A subscription could not be established.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// An established subscription broke.
    #[error("Connection lost: {0}")]
    Connection(String),
}

/// A pub/sub medium shared by every coordinator in a deployment.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Backend technology name (e.g. "memory", "redis").
    fn name(&self) -> &'static str;

    /// The channel/topic coordinators exchange envelopes on.
    fn channel(&self) -> &str;

    /// Publish one message to the shared channel. At-least-once,
    /// best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend did not accept the message.
    async fn publish(&self, payload: Bytes) -> Result<(), BackendError>;

    /// Open a subscription to the shared channel. The backend may be
    /// asked for a fresh subscription after a connection loss.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be established.
    async fn subscribe(&self) -> Result<Box<dyn Subscription>, BackendError>;
}

/// An open subscription producing raw messages.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message on the channel.
    ///
    /// # Errors
    ///
    /// Returns an error when the subscription breaks; the caller is
    /// expected to resubscribe.
    async fn next(&mut self) -> Result<Bytes, BackendError>;
}
