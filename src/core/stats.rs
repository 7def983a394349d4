//! # Delivery counters.
//!
//! [`Stats`] is shared by publishers and the dispatch loop; every counter is a
//! relaxed atomic. [`StatsSnapshot`] is a plain copy for assertions and export.
//!
//! Counting rules:
//! - `published` counts envelopes accepted into ingress;
//! - `delivered` counts items stored in a queue (per queue, so broadcast counts each target);
//! - `evicted` items were pushed out by `DropOldest` (the incoming item is also `delivered`);
//! - `dropped_newest` and `rejected` items never reached a queue;
//! - `dropped_no_subscriber` covers keys with no entry and entries with no reader left.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::queue::Delivery;

/// Live broker counters.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    published: AtomicU64,
    ingress_full: AtomicU64,
    delivered: AtomicU64,
    dropped_no_subscriber: AtomicU64,
    dropped_newest: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    delivery_closed: AtomicU64,
}

/// Point-in-time copy of the broker counters, from [`Broker::stats`](crate::Broker::stats).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Envelopes accepted by `publish`.
    pub published: u64,
    /// `publish` calls refused because bounded ingress was full.
    pub ingress_full: u64,
    /// Items stored in an output queue.
    pub delivered: u64,
    /// Envelopes discarded because nobody was subscribed.
    pub dropped_no_subscriber: u64,
    /// Items discarded by `DropNewest`.
    pub dropped_newest: u64,
    /// Buffered items evicted by `DropOldest`.
    pub evicted: u64,
    /// Items refused by `RejectWrite`.
    pub rejected: u64,
    /// Deliveries that found their queue already completed.
    pub delivery_closed: u64,
}

#[inline]
fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl Stats {
    pub(crate) fn record_published(&self) {
        bump(&self.published);
    }

    pub(crate) fn record_ingress_full(&self) {
        bump(&self.ingress_full);
    }

    pub(crate) fn record_no_subscriber(&self) {
        bump(&self.dropped_no_subscriber);
    }

    pub(crate) fn record(&self, outcome: Delivery) {
        match outcome {
            Delivery::Enqueued => bump(&self.delivered),
            Delivery::EvictedOldest => {
                bump(&self.evicted);
                bump(&self.delivered);
            }
            Delivery::DroppedNewest => bump(&self.dropped_newest),
            Delivery::Rejected => bump(&self.rejected),
            Delivery::Closed => bump(&self.delivery_closed),
            Delivery::NoReaders => bump(&self.dropped_no_subscriber),
        }
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            published: load(&self.published),
            ingress_full: load(&self.ingress_full),
            delivered: load(&self.delivered),
            dropped_no_subscriber: load(&self.dropped_no_subscriber),
            dropped_newest: load(&self.dropped_newest),
            evicted: load(&self.evicted),
            rejected: load(&self.rejected),
            delivery_closed: load(&self.delivery_closed),
        }
    }
}
