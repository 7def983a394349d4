//! # Subscriber handle.
//!
//! A [`Subscription`] is one consumer's view of a key's output queue. It owns a
//! reader cursor and one unit of the key's subscriber count.
//!
//! ## Rules
//! - Items arrive in publish order; each handle sees every item dispatched to its key after it attached.
//! - `recv()` returns `None` once the queue is completed and drained (entry removed, or `Broker::close`).
//! - Dropping the handle, or the stream from [`into_events`](Subscription::into_events),
//!   releases it exactly once. [`release`](Subscription::release) consumes the handle.
//!
//! ## Example
//! ```rust
//! # async fn demo() {
//! use futures::StreamExt;
//! use keyfan::{Broker, BrokerConfig};
//!
//! let broker = Broker::<String, String>::builder(BrokerConfig::default()).build();
//! broker.start().unwrap();
//!
//! let sub = broker.subscribe("u1".to_string());
//! broker.publish("u1".to_string(), "hello".to_string()).unwrap();
//!
//! let first: Vec<String> = sub.into_events().take(1).collect().await;
//! assert_eq!(first, vec!["hello".to_string()]);
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use futures::Stream;

use crate::core::queue::OutputQueue;
use crate::core::registry::{Registry, RouteKey};
use crate::error::TryRecvError;

/// Handle to the events of one routing key.
pub struct Subscription<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    key: K,
    queue: Arc<OutputQueue<V>>,
    reader: u64,
    registry: Arc<Registry<K, V>>,
    released: bool,
}

impl<K, V> Subscription<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    pub(crate) fn new(
        key: K,
        queue: Arc<OutputQueue<V>>,
        reader: u64,
        registry: Arc<Registry<K, V>>,
    ) -> Self {
        Self {
            key,
            queue,
            reader,
            registry,
            released: false,
        }
    }

    /// Routing key this handle is attached to.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Waits for the next item; `None` once the queue is completed and drained.
    pub async fn recv(&mut self) -> Option<V> {
        self.queue.read(self.reader).await
    }

    /// Takes the next item without waiting.
    pub fn try_recv(&mut self) -> Result<V, TryRecvError> {
        self.queue.try_read(self.reader)
    }

    /// Items buffered for this handle and not yet received.
    pub fn pending(&self) -> usize {
        self.queue.pending(self.reader)
    }

    /// True once the queue was completed (no new items will arrive).
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Borrowing stream over incoming items; the handle stays usable afterwards.
    pub fn events(&mut self) -> impl Stream<Item = V> + '_ {
        futures::stream::unfold(self, |sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
    }

    /// Owning stream over incoming items; dropping the stream releases the handle.
    pub fn into_events(self) -> impl Stream<Item = V> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let item = sub.recv().await?;
            Some((item, sub))
        })
    }

    /// Releases the handle now instead of at drop.
    pub fn release(mut self) {
        self.release_once();
    }

    pub(crate) fn queue_id(&self) -> u64 {
        self.queue.id()
    }

    fn release_once(&mut self) {
        if !std::mem::replace(&mut self.released, true) {
            self.registry
                .release(&self.key, self.queue.id(), self.reader);
        }
    }
}

impl<K, V> Drop for Subscription<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<K, V> fmt::Debug for Subscription<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("queue", &self.queue.id())
            .field("reader", &self.reader)
            .finish()
    }
}
