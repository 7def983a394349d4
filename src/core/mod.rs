//! Broker core: registry, output queues, dispatch and lifecycle.
//!
//! Public surface: [`Broker`], [`BrokerBuilder`], [`Publisher`], [`Envelope`],
//! [`Subscription`], [`RouteKey`] and the delivery counters.
//!
//! Internal modules:
//! - [`queue`]: per-key output queue with per-reader cursors and overflow handling;
//! - [`registry`]: sharded key → queue map with subscriber counts;
//! - [`dispatch`]: the single loop draining ingress into queues;
//! - [`publisher`]: envelopes and the ingress channel;
//! - [`shutdown`]: OS signal handling for the serve loop.

mod broker;
mod builder;
mod dispatch;
mod publisher;
mod queue;
mod registry;
mod shutdown;
mod stats;
mod subscription;

pub use broker::Broker;
pub use builder::BrokerBuilder;
pub use publisher::{Envelope, Publisher};
pub use registry::RouteKey;
pub use stats::StatsSnapshot;
pub use subscription::Subscription;
