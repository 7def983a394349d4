//! Delivery and reconnect policies.
//!
//! ## Contents
//! - [`OverflowPolicy`] what a full bounded output queue does with a new item
//! - [`BackoffPolicy`] how long a failed source waits before reconnecting
//! - [`JitterPolicy`] randomization of reconnect delays
//!
//! ## Quick wiring
//! ```text
//! BrokerConfig { queue_capacity, overflow: OverflowPolicy, reconnect: BackoffPolicy, .. }
//!      ├─► core::queue::OutputQueue   consults overflow when full
//!      └─► sources::SourceActor       backoff.next(failures) between reconnects
//! ```

mod backoff;
mod jitter;
mod overflow;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use overflow::OverflowPolicy;
