//! # keyfan
//!
//! **keyfan** is an in-process keyed fan-out broker for tokio.
//!
//! It takes one ordered stream of events, each tagged with a routing key (a
//! user id, a session, a tenant), and redistributes every event to the
//! consumers currently subscribed to that key. Consumers come and go; events
//! for keys nobody listens to are dropped without buffering. Delivery is
//! volatile and best-effort: nothing is persisted, nothing crosses the process.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌────────────┐  ┌────────────┐  ┌────────────┐
//!  │   Source   │  │   Source   │  │  app code  │
//!  │ (stream,   │  │ (json file,│  │ (handlers) │
//!  │  rpc, ...) │  │  timer)    │  │            │
//!  └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!        ▼               ▼               │
//!   SourceActor     SourceActor          │   reconnect with BackoffPolicy
//!        └───────────────┼───────────────┘
//!                        ▼
//!              Publisher::publish(key, payload)      Full / Closed only
//!                        ▼
//!              [ ingress (bounded | unbounded) ]
//!                        ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  dispatch loop (one per broker)                              │
//! │    Keyed:     Registry.lookup(key) → push   | none → drop    │
//! │    Broadcast: every registered queue → push                  │
//! └──────┬──────────────────────┬──────────────────────┬─────────┘
//!        ▼                      ▼                      ▼
//!  OutputQueue("alice")   OutputQueue("bob")     OutputQueue(..)   OverflowPolicy when full
//!   ├─ Subscription         └─ Subscription
//!   └─ Subscription
//!
//!  Registry / dispatch / SourceActor ── Event ──► Bus ──► ObserverSet ──► LogWriter, custom
//! ```
//!
//! ### Subscription lifecycle
//! ```text
//! subscribe(k):  no entry → create queue, count = 1      (EntryCreated)
//!                entry    → count += 1, share queue      (SubscriptionOpened)
//! drop / release: count -= 1 → at 0 remove entry, complete queue (EntryRemoved)
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                                  |
//! |-------------------|---------------------------------------------------------------|-----------------------------------------------------|
//! | **Broker**        | Lifecycle, publishing, subscribing, introspection.            | [`Broker`], [`BrokerBuilder`], [`Publisher`]        |
//! | **Consumption**   | Per-key handles with RAII release and `Stream` adapters.      | [`Subscription`]                                    |
//! | **Backpressure**  | Bounded queues with explicit overflow behavior.               | [`OverflowPolicy`], [`BrokerConfig`]                |
//! | **Sources**       | Pluggable producers with automatic reconnect.                 | [`Source`], [`SourceFn`], [`StreamSource`], [`JsonLinesSource`], [`IntervalSource`] |
//! | **Observability** | Runtime events, observers and delivery counters.              | [`Event`], [`Observe`], [`StatsSnapshot`]           |
//! | **Errors**        | Typed errors with stable labels.                              | [`BrokerError`], [`PublishError`], [`SourceError`]  |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], an observer forwarding events to `tracing`.
//!
//! ## Example
//! ```rust
//! use keyfan::{Broker, BrokerConfig, OverflowPolicy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = BrokerConfig {
//!         queue_capacity: 3,
//!         overflow: OverflowPolicy::DropOldest,
//!         ..BrokerConfig::default()
//!     };
//!     let broker = Broker::<String, String>::builder(cfg).build();
//!     broker.start()?;
//!
//!     let mut u1 = broker.subscribe("u1".to_string());
//!     broker.publish("u1".to_string(), "a".to_string())?;
//!     broker.publish("u2".to_string(), "b".to_string())?;
//!     broker.publish("u1".to_string(), "c".to_string())?;
//!
//!     assert_eq!(u1.recv().await.as_deref(), Some("a"));
//!     assert_eq!(u1.recv().await.as_deref(), Some("c"));
//!
//!     broker.close().await?;
//!     assert_eq!(u1.recv().await, None);
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod observers;
mod policies;
mod sources;

// ---- Public re-exports ----

pub use crate::config::{BrokerConfig, DeliveryMode};
pub use crate::core::{
    Broker, BrokerBuilder, Envelope, Publisher, RouteKey, StatsSnapshot, Subscription,
};
pub use crate::error::{BrokerError, ConfigError, PublishError, SourceError, TryRecvError};
pub use crate::events::{Bus, Event, EventKind};
pub use crate::observers::{Observe, ObserverSet};
pub use crate::policies::{BackoffPolicy, JitterPolicy, OverflowPolicy};
pub use crate::sources::{IntervalSource, JsonLinesSource, Source, SourceFn, SourceRef, StreamSource};

// Built-in `tracing` observer.
// Disable with: `default-features = false`
#[cfg(feature = "logging")]
pub use crate::observers::LogWriter;
