//! # ripple-cluster
//!
//! Distributed pub/sub coordination for the Ripple realtime engine.
//!
//! A [`ClusterCoordinator`] wraps a process-local
//! [`RoomManager`](ripple_core::RoomManager) and keeps room state and
//! emissions eventually consistent across any number of processes that
//! share one pub/sub backend:
//!
//! ```text
//!  process A                 shared channel                process B
//! ┌──────────────┐   publish   ┌────────┐   deliver   ┌──────────────┐
//! │ Coordinator  │────────────▶│Backend │────────────▶│ Coordinator  │
//! │  RoomManager │◀────────────│        │◀────────────│  RoomManager │
//! └──────────────┘   deliver   └────────┘   publish   └──────────────┘
//! ```
//!
//! Emits are published as [`Envelope`] messages and applied by every
//! listener, including the publisher's own; acknowledgement callbacks
//! travel back to their origin scoped by a per-process host id. The
//! backend is a small capability interface ([`Backend`]) so any
//! publish/subscribe medium plugs in without coordinator changes;
//! [`MemoryBroker`] is the in-process reference implementation.

pub mod backend;
pub mod coordinator;
pub mod envelope;
pub mod memory;

pub use backend::{Backend, BackendError, Subscription};
pub use coordinator::{ClusterCoordinator, ClusterError};
pub use envelope::{AckRef, Envelope, EnvelopeError};
pub use memory::{MemoryBackend, MemoryBroker};
