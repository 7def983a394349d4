//! Runtime telemetry: event types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` (subscription lifecycle), dispatch loop
//!   (overflow, rejection, start/stop), `SourceActor` (source lifecycle),
//!   `Broker::run_until_shutdown` (shutdown), `ObserverSet` workers (observer faults).
//! - **Consumers**: the observer listener spawned by `Broker::start`, and any
//!   receiver obtained from `Broker::monitor`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
