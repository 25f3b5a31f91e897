//! # ripple-core
//!
//! Room and session management core for the Ripple realtime engine.
//!
//! This crate is the process-local ground truth for which sessions are
//! connected to which namespaces, which rooms they belong to, and which
//! acknowledgement callbacks are outstanding:
//!
//! - **RoomTable** - namespace/room membership with deferred purging
//! - **AckRegistry** - one-shot acknowledgement callbacks per session
//! - **RoomManager** - connection lifecycle and event fan-out
//! - **EventObserver** - explicit hook points for instrumentation
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   Façade    │────▶│ RoomManager  │────▶│  RoomTable  │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!        ▲                   │  │
//!        │    deliver()      │  ▼
//!        └───────────────────┘ ┌─────────────┐
//!                              │ AckRegistry │
//!                              └─────────────┘
//! ```
//!
//! The manager never talks to a transport. It resolves participants and
//! calls back into the façade through the [`Delivery`] trait, one session
//! at a time.

pub mod ack;
pub mod hooks;
pub mod manager;
pub mod rooms;

pub use ack::{AckCallback, AckRegistry};
pub use hooks::EventObserver;
pub use manager::{Delivery, EmitOptions, RoomManager};
pub use rooms::RoomTable;

/// The namespace a session lands in when none is named.
pub const DEFAULT_NAMESPACE: &str = "/";
