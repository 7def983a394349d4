//! # Dispatch loop: drains ingress and fans envelopes out to output queues.
//!
//! ```text
//! loop {
//!   select! {
//!     token.cancelled()  → stop ("cancelled")
//!     ingress.recv()     → None → stop ("ingress_closed")
//!                        → Some(env)
//!                             Keyed:     registry.lookup(env.key) ─┬─ None → dropped_no_subscriber
//!                                                                  └─ Some(q) → deliver(q)
//!                             Broadcast: registry.queues() → deliver(q) for each
//!   }
//! }
//!
//! deliver(q, item) = select! { cancelled → stop, q.push(item) → record outcome }
//! ```
//!
//! ## Rules
//! - One loop per broker, so items for a key enter its queue in publish order.
//! - Only `Wait` queues can suspend the loop; cancellation interrupts that wait.
//! - Queues are left open when the loop stops.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::DeliveryMode;
use crate::core::publisher::IngressRx;
use crate::core::queue::{Delivery, OutputQueue};
use crate::core::registry::{Registry, RouteKey, key_label};
use crate::core::stats::Stats;
use crate::events::{Bus, Event, EventKind};
use crate::policies::OverflowPolicy;

pub(crate) struct Dispatcher<K, V> {
    pub registry: Arc<Registry<K, V>>,
    pub stats: Arc<Stats>,
    pub bus: Bus,
    pub mode: DeliveryMode,
    pub overflow: OverflowPolicy,
}

impl<K, V> Dispatcher<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    pub(crate) async fn run(self, mut rx: IngressRx<K, V>, token: CancellationToken) {
        info!(mode = ?self.mode, "dispatch loop started");
        self.bus.publish(Event::new(EventKind::DispatchStarted));

        let reason = loop {
            let env = tokio::select! {
                biased;
                _ = token.cancelled() => break "cancelled",
                env = rx.recv() => match env {
                    Some(env) => env,
                    None => break "ingress_closed",
                },
            };
            trace!(key = ?env.key, seq = env.seq, "dispatching");

            let completed = match self.mode {
                DeliveryMode::Keyed => match self.registry.lookup(&env.key) {
                    Some(queue) => self.deliver(&env.key, &queue, env.payload, &token).await,
                    None => {
                        self.stats.record_no_subscriber();
                        trace!(key = ?env.key, seq = env.seq, "no subscriber, dropped");
                        true
                    }
                },
                DeliveryMode::Broadcast => {
                    let targets = self.registry.queues();
                    if targets.is_empty() {
                        self.stats.record_no_subscriber();
                    }
                    let mut completed = true;
                    for (key, queue) in &targets {
                        if !self.deliver(key, queue, env.payload.clone(), &token).await {
                            completed = false;
                            break;
                        }
                    }
                    completed
                }
            };
            if !completed {
                break "cancelled";
            }
        };

        info!(reason, "dispatch loop stopped");
        self.bus
            .publish(Event::new(EventKind::DispatchStopped).with_reason(reason));
    }

    /// Pushes one item; returns false if cancelled while waiting for space.
    async fn deliver(
        &self,
        key: &K,
        queue: &OutputQueue<V>,
        item: V,
        token: &CancellationToken,
    ) -> bool {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => return false,
            outcome = queue.push(item) => outcome,
        };
        self.stats.record(outcome);

        match outcome {
            Delivery::Enqueued | Delivery::NoReaders => {}
            Delivery::DroppedNewest | Delivery::EvictedOldest => {
                debug!(key = ?key, policy = self.overflow.as_label(), "output queue overflow");
                self.bus.publish(
                    Event::new(EventKind::QueueOverflow)
                        .with_key(key_label(key))
                        .with_reason(self.overflow.as_label()),
                );
            }
            Delivery::Rejected => {
                debug!(key = ?key, "write rejected by full output queue");
                self.bus
                    .publish(Event::new(EventKind::WriteRejected).with_key(key_label(key)));
            }
            Delivery::Closed => {
                trace!(key = ?key, "output queue already completed");
                self.bus
                    .publish(Event::new(EventKind::DeliveryClosed).with_key(key_label(key)));
            }
        }
        true
    }
}
