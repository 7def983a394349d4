//! # Telemetry bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] carrying runtime
//! [`Event`]s from the registry, the dispatch loop and the source runners to
//! whoever listens (the observer fan-out, tests, external monitoring).
//!
//! ```text
//! Registry ─────┐
//! Dispatch ─────┼──► Bus ──► observer listener ──► ObserverSet
//! SourceActor ──┘       └──► Broker::monitor() receivers
//! ```
//!
//! ## Rules
//! - `publish()` never blocks and never fails; with no receivers the event is dropped.
//! - One ring buffer shared by all receivers; laggards see `RecvError::Lagged(n)`.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given ring capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver that observes events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn receivers_see_events_after_subscribing() {
        let bus = Bus::new(8);
        bus.publish(Event::new(EventKind::DispatchStarted));

        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::EntryCreated).with_key("k"));

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::EntryCreated);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::GraceExceeded));
        assert_eq!(bus.receiver_count(), 0);
    }
}
