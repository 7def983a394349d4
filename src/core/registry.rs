//! # Subscription registry: routing key → shared output queue + subscriber count.
//!
//! ```text
//! subscribe(k) ──► entry(k) ─┬─ Vacant   → new OutputQueue{id}, subscribers = 1  → EntryCreated
//!                            └─ Occupied → subscribers += 1, attach reader
//!
//! release(k, id) ──► get_mut(k) ─┬─ id mismatch / missing → no-op (stale handle)
//!                                └─ subscribers -= 1 (saturating)
//!                                       └─ 0 → remove_if(id, 0) → close queue → EntryRemoved
//!
//! lookup(k) ──► get(k) → Arc<OutputQueue>   (read-only, never half-created)
//! ```
//!
//! ## Rules
//! - At most one entry per key; creation happens under the key's shard lock.
//! - The map is sharded ([`DashMap`]); unrelated keys never serialize behind one lock.
//! - Removal re-checks the queue id and the count, so a subscribe racing a final
//!   release keeps the entry alive.
//! - After `close_all`, new subscriptions get an already-completed queue.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, trace};

use crate::core::queue::{OutputQueue, QueueConfig};
use crate::core::subscription::Subscription;
use crate::events::{Bus, Event, EventKind};

/// Bounds a routing key must satisfy.
///
/// Blanket-implemented; `String`, `u64`, `Uuid`-like newtypes all qualify.
pub trait RouteKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> RouteKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

pub(crate) fn key_label<K: Debug>(key: &K) -> String {
    format!("{key:?}")
}

struct Slot<V> {
    queue: Arc<OutputQueue<V>>,
    subscribers: usize,
}

/// Concurrent map of active keys.
pub(crate) struct Registry<K, V> {
    entries: DashMap<K, Slot<V>>,
    next_id: AtomicU64,
    queue_cfg: QueueConfig,
    closed: AtomicBool,
    bus: Bus,
}

impl<K, V> Registry<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    pub(crate) fn new(queue_cfg: QueueConfig, bus: Bus) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            queue_cfg,
            closed: AtomicBool::new(false),
            bus,
        }
    }

    fn new_queue(&self) -> Arc<OutputQueue<V>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Arc::new(OutputQueue::new(id, self.queue_cfg))
    }

    /// Attaches a new subscription to `key`, creating the entry if absent.
    pub(crate) fn subscribe(self: &Arc<Self>, key: K) -> Subscription<K, V> {
        let (queue, reader, subscribers, created) = match self.entries.entry(key.clone()) {
            // Checked under the shard lock so `close_all` cannot miss this entry.
            _ if self.closed.load(Ordering::SeqCst) => {
                let queue = self.new_queue();
                let reader = queue.attach_reader();
                queue.close();
                return Subscription::new(key, queue, reader, Arc::clone(self));
            }
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.subscribers += 1;
                let reader = slot.queue.attach_reader();
                (Arc::clone(&slot.queue), reader, slot.subscribers, false)
            }
            Entry::Vacant(vacant) => {
                let queue = self.new_queue();
                let reader = queue.attach_reader();
                vacant.insert(Slot {
                    queue: Arc::clone(&queue),
                    subscribers: 1,
                });
                (queue, reader, 1, true)
            }
        };

        let label = key_label(&key);
        if created {
            debug!(key = %label, queue = queue.id(), "registry entry created");
            self.bus
                .publish(Event::new(EventKind::EntryCreated).with_key(label.as_str()));
        }
        self.bus.publish(
            Event::new(EventKind::SubscriptionOpened)
                .with_key(label)
                .with_subscribers(subscribers),
        );
        Subscription::new(key, queue, reader, Arc::clone(self))
    }

    /// Detaches `reader` and decrements the count of the entry owning `queue_id`.
    ///
    /// No-op if the entry is gone or belongs to a newer queue.
    pub(crate) fn release(&self, key: &K, queue_id: u64, reader: u64) {
        let remaining = {
            let Some(mut slot) = self.entries.get_mut(key) else {
                trace!(key = ?key, "release of missing entry ignored");
                return;
            };
            if slot.queue.id() != queue_id {
                trace!(key = ?key, "stale release ignored");
                return;
            }
            slot.queue.detach_reader(reader);
            slot.subscribers = slot.subscribers.saturating_sub(1);
            slot.subscribers
        };

        let label = key_label(key);
        self.bus.publish(
            Event::new(EventKind::SubscriptionReleased)
                .with_key(label.as_str())
                .with_subscribers(remaining),
        );
        if remaining > 0 {
            return;
        }

        let removed = self
            .entries
            .remove_if(key, |_, slot| slot.queue.id() == queue_id && slot.subscribers == 0);
        if let Some((_, slot)) = removed {
            slot.queue.close();
            debug!(key = %label, queue = queue_id, "registry entry removed");
            self.bus
                .publish(Event::new(EventKind::EntryRemoved).with_key(label));
        }
    }

    /// Current queue for `key`, if anyone is subscribed.
    pub(crate) fn lookup(&self, key: &K) -> Option<Arc<OutputQueue<V>>> {
        self.entries.get(key).map(|slot| Arc::clone(&slot.queue))
    }

    /// Every current queue with its key (broadcast delivery).
    pub(crate) fn queues(&self) -> Vec<(K, Arc<OutputQueue<V>>)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.value().queue)))
            .collect()
    }

    pub(crate) fn subscriber_count(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, |slot| slot.subscribers)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Removes every entry and completes its queue; later subscriptions start closed.
    pub(crate) fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.entries.retain(|key, slot| {
            slot.queue.close();
            self.bus
                .publish(Event::new(EventKind::EntryRemoved).with_key(key_label(key)));
            false
        });
    }
}
