//! Cross-process message envelopes.
//!
//! Envelopes are the wire shape coordinators exchange through the shared
//! channel: a `method` discriminator plus method-specific fields,
//! serialized as MessagePack maps so they survive any backend's native
//! payload format.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Envelope codec errors.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Reference to a callback held in the publishing process's registry.
///
/// Only the coordinates travel; the callback itself is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRef {
    /// Session the callback was registered under.
    pub sid: String,
    /// Namespace the callback was registered under.
    pub namespace: String,
    /// Id allocated by the publisher's ack registry.
    pub id: u64,
}

/// A message exchanged between coordinators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Envelope {
    /// Fan an event out to a room on every process.
    Emit {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
        /// Target namespace.
        namespace: String,
        /// Target room; `None` addresses the whole namespace.
        #[serde(skip_serializing_if = "Option::is_none")]
        room: Option<String>,
        /// Session excluded from the fan-out.
        #[serde(skip_serializing_if = "Option::is_none")]
        skip_sid: Option<String>,
        /// Callback coordinates, when the publisher requested one.
        #[serde(skip_serializing_if = "Option::is_none")]
        callback: Option<AckRef>,
        /// Publishing process.
        host_id: String,
    },

    /// Remove a session wherever it is connected.
    Disconnect {
        /// Session to remove.
        sid: String,
        /// Namespace to remove it from.
        namespace: String,
        /// Publishing process.
        host_id: String,
    },

    /// Remove every participant from a room on every process.
    CloseRoom {
        /// Room to close.
        room: String,
        /// Namespace the room lives in.
        namespace: String,
        /// Publishing process.
        host_id: String,
    },

    /// An acknowledgement travelling back to the process that holds the
    /// callback.
    Callback {
        /// Process that registered the callback.
        host_id: String,
        /// Session the callback was registered under.
        sid: String,
        /// Namespace the callback was registered under.
        namespace: String,
        /// Callback id.
        id: u64,
        /// Arguments the client attached to its acknowledgement.
        args: Value,
    },
}

impl Envelope {
    /// Encode to MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        Ok(rmp_serde::to_vec_named(self)?.into())
    }

    /// Decode from MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a valid envelope.
    pub fn decode(data: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(rmp_serde::from_slice(data)?)
    }

    /// The `method` discriminator, for logging.
    #[must_use]
    pub fn method(&self) -> &'static str {
        match self {
            Envelope::Emit { .. } => "emit",
            Envelope::Disconnect { .. } => "disconnect",
            Envelope::CloseRoom { .. } => "close_room",
            Envelope::Callback { .. } => "callback",
        }
    }

    /// The publishing process's host id.
    #[must_use]
    pub fn host_id(&self) -> &str {
        match self {
            Envelope::Emit { host_id, .. }
            | Envelope::Disconnect { host_id, .. }
            | Envelope::CloseRoom { host_id, .. }
            | Envelope::Callback { host_id, .. } => host_id,
        }
    }
}
