//! # ripple-server
//!
//! Server-facing façade for the Ripple realtime engine.
//!
//! A [`Server`] owns exactly one room manager - standalone, or wrapped in
//! a cluster coordinator - and supplies the low-level "deliver to one
//! session" primitive the core calls back into: every connected session
//! gets an outbox channel, and the transport layer above drains it.
//!
//! The crate also carries the deployment concerns around the core:
//! configuration loading ([`Config`]) and metrics export wired through
//! the core's observer hooks ([`metrics`]).

pub mod config;
pub mod metrics;
pub mod server;
pub mod session;

pub use config::Config;
pub use server::Server;
pub use session::{OutboundEvent, SessionRegistry};
