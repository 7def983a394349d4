//! # Runtime events emitted by the broker, its registry and its sources.
//!
//! These are **telemetry** events describing what the broker does; they are not
//! the routed payloads (see [`Envelope`](crate::Envelope) for those).
//!
//! [`EventKind`] groups events into:
//! - **Subscription lifecycle**: handles opened/released, registry entries created/removed
//! - **Delivery**: dispatch loop start/stop, overflow, rejected writes, closed queues
//! - **Sources**: starting, failing, reconnecting, completing
//! - **Shutdown and observers**
//!
//! Each [`Event`] carries a per-process monotonic `seq` for ordering.
//!
//! ## Example
//! ```rust
//! use keyfan::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::QueueOverflow)
//!     .with_key("user-7")
//!     .with_reason("drop_oldest");
//!
//! assert_eq!(ev.kind, EventKind::QueueOverflow);
//! assert_eq!(ev.key.as_deref(), Some("user-7"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscription lifecycle ===
    /// A subscription handle was created.
    ///
    /// Sets: `key`, `subscribers` (count after the increment).
    SubscriptionOpened,

    /// A subscription handle was released (explicitly or on drop).
    ///
    /// Sets: `key`, `subscribers` (count after the decrement).
    SubscriptionReleased,

    /// First subscriber for a key; a fresh output queue was created.
    ///
    /// Sets: `key`.
    EntryCreated,

    /// Last subscriber for a key left; the entry and its queue are gone.
    ///
    /// Sets: `key`.
    EntryRemoved,

    // === Delivery ===
    /// Dispatch loop started draining the ingress stream.
    DispatchStarted,

    /// Dispatch loop exited.
    ///
    /// Sets: `reason` (`"cancelled"` or `"ingress_closed"`).
    DispatchStopped,

    /// A full bounded queue dropped an item (`DropNewest` or `DropOldest`).
    ///
    /// Sets: `key`, `reason` (policy label).
    QueueOverflow,

    /// A full bounded queue with `RejectWrite` refused an item.
    ///
    /// Sets: `key`.
    WriteRejected,

    /// Delivery found the queue already completed (subscriber gone mid-flight).
    ///
    /// Sets: `key`.
    DeliveryClosed,

    // === Sources ===
    /// A source is (re)connecting.
    ///
    /// Sets: `source`, `attempt`.
    SourceStarting,

    /// A source run failed with a transient error.
    ///
    /// Sets: `source`, `attempt`, `reason`.
    SourceFailed,

    /// A reconnect was scheduled after a failure.
    ///
    /// Sets: `source`, `attempt`, `delay_ms`, `reason`.
    ReconnectScheduled,

    /// A source finished on its own (stream exhausted).
    ///
    /// Sets: `source`, `attempt`.
    SourceCompleted,

    /// A source stopped permanently after a fatal error.
    ///
    /// Sets: `source`, `attempt`, `reason`.
    SourceDead,

    // === Shutdown ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    /// All sources stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some sources did not stop in time.
    GraceExceeded,

    // === Observers ===
    /// An observer dropped an event (queue full or worker gone).
    ///
    /// Sets: `source` (observer name), `reason`.
    ObserverOverflow,

    /// An observer panicked while handling an event.
    ///
    /// Sets: `source` (observer name), `reason` (panic message).
    ObserverPanicked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Routing key, rendered with `Debug`.
    pub key: Option<Arc<str>>,
    /// Source or observer name.
    pub source: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Reconnect delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// Subscriber count for `key` after the change.
    pub subscribers: Option<u32>,
}

impl Event {
    /// Creates an event of the given kind stamped with now and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            key: None,
            source: None,
            reason: None,
            attempt: None,
            delay_ms: None,
            subscribers: None,
        }
    }

    /// Attaches a routing key.
    #[inline]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Attaches a source (or observer) name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    /// Attaches the subscriber count after a lifecycle change.
    #[inline]
    pub fn with_subscribers(mut self, n: usize) -> Self {
        self.subscribers = Some(n.min(u32::MAX as usize) as u32);
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow)
            .with_source(observer)
            .with_reason(reason)
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &'static str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked)
            .with_source(observer)
            .with_reason(info)
    }

    /// True for events describing observer trouble (never re-reported on overflow).
    #[inline]
    pub fn is_observer_fault(&self) -> bool {
        matches!(
            self.kind,
            EventKind::ObserverOverflow | EventKind::ObserverPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::DispatchStarted);
        let b = Event::new(EventKind::DispatchStopped);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_saturates_to_u32() {
        let ev = Event::new(EventKind::ReconnectScheduled).with_delay(Duration::from_secs(u64::MAX / 2));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn observer_faults_are_flagged() {
        assert!(Event::observer_overflow("log", "full").is_observer_fault());
        assert!(Event::observer_panicked("log", "boom".into()).is_observer_fault());
        assert!(!Event::new(EventKind::EntryCreated).is_observer_fault());
    }
}
