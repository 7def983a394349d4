//! # Ingress: envelopes, publishers and the channel feeding the dispatch loop.
//!
//! ```text
//! Publisher::publish(k, v) ──► Envelope{k, v, seq} ──► [ingress mpsc] ──► dispatch loop
//!                 │
//!                 └─ Full (bounded, at capacity) / Closed (dispatch gone)
//! ```
//!
//! "No subscriber for this key" is decided later by the dispatch loop and is
//! never a publish error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::core::stats::Stats;
use crate::error::PublishError;

/// A routed event: payload plus routing key and sequence hint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<K, V> {
    /// Routing key.
    pub key: K,
    /// Opaque payload handed to subscribers.
    pub payload: V,
    /// Per-broker monotonic sequence hint assigned at publish time.
    pub seq: u64,
}

pub(crate) enum IngressTx<K, V> {
    Bounded(mpsc::Sender<Envelope<K, V>>),
    Unbounded(mpsc::UnboundedSender<Envelope<K, V>>),
}

pub(crate) enum IngressRx<K, V> {
    Bounded(mpsc::Receiver<Envelope<K, V>>),
    Unbounded(mpsc::UnboundedReceiver<Envelope<K, V>>),
}

impl<K, V> Clone for IngressTx<K, V> {
    fn clone(&self) -> Self {
        match self {
            IngressTx::Bounded(tx) => IngressTx::Bounded(tx.clone()),
            IngressTx::Unbounded(tx) => IngressTx::Unbounded(tx.clone()),
        }
    }
}

impl<K, V> IngressRx<K, V> {
    pub(crate) async fn recv(&mut self) -> Option<Envelope<K, V>> {
        match self {
            IngressRx::Bounded(rx) => rx.recv().await,
            IngressRx::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Creates the ingress channel; `None` means unbounded.
pub(crate) fn ingress<K, V>(limit: Option<usize>) -> (IngressTx<K, V>, IngressRx<K, V>) {
    match limit {
        Some(cap) => {
            let (tx, rx) = mpsc::channel(cap);
            (IngressTx::Bounded(tx), IngressRx::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (IngressTx::Unbounded(tx), IngressRx::Unbounded(rx))
        }
    }
}

/// Cloneable write handle to a broker's ingress.
///
/// Handed to every [`Source`](crate::Source) run and available from
/// [`Broker::publisher`](crate::Broker::publisher).
pub struct Publisher<K, V> {
    tx: IngressTx<K, V>,
    seq: Arc<AtomicU64>,
    stats: Arc<Stats>,
}

impl<K, V> Clone for Publisher<K, V> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            seq: Arc::clone(&self.seq),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K, V> Publisher<K, V> {
    pub(crate) fn new(tx: IngressTx<K, V>, stats: Arc<Stats>) -> Self {
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
            stats,
        }
    }

    fn envelope(&self, key: K, payload: V) -> Envelope<K, V> {
        Envelope {
            key,
            payload,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Hands an event to the broker without waiting.
    ///
    /// Fails only with [`PublishError::Full`] (bounded ingress at capacity) or
    /// [`PublishError::Closed`] (broker stopped).
    pub fn publish(&self, key: K, payload: V) -> Result<(), PublishError> {
        let env = self.envelope(key, payload);
        let res = match &self.tx {
            IngressTx::Bounded(tx) => tx.try_send(env).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => PublishError::Full,
                mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
            }),
            IngressTx::Unbounded(tx) => tx.send(env).map_err(|_| PublishError::Closed),
        };
        match res {
            Ok(()) => self.stats.record_published(),
            Err(PublishError::Full) => self.stats.record_ingress_full(),
            Err(_) => {}
        }
        res
    }

    /// Hands an event to the broker, waiting for ingress space if bounded.
    pub async fn publish_wait(&self, key: K, payload: V) -> Result<(), PublishError> {
        let env = self.envelope(key, payload);
        let res = match &self.tx {
            IngressTx::Bounded(tx) => tx.send(env).await.map_err(|_| PublishError::Closed),
            IngressTx::Unbounded(tx) => tx.send(env).map_err(|_| PublishError::Closed),
        };
        if res.is_ok() {
            self.stats.record_published();
        }
        res
    }

    /// True once the dispatch loop has gone away.
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            IngressTx::Bounded(tx) => tx.is_closed(),
            IngressTx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn bounded_ingress_reports_full() {
        let stats = Arc::new(Stats::default());
        let (tx, mut rx) = ingress::<&str, u32>(Some(1));
        let publisher = Publisher::new(tx, Arc::clone(&stats));

        publisher.publish("a", 1).unwrap();
        assert_matches!(publisher.publish("a", 2), Err(PublishError::Full));
        assert_eq!(stats.snapshot().ingress_full, 1);

        let env = rx.recv().await.unwrap();
        assert_eq!((env.key, env.payload), ("a", 1));
    }

    #[tokio::test]
    async fn sequence_is_shared_by_clones() {
        let (tx, mut rx) = ingress::<&str, u32>(None);
        let a = Publisher::new(tx, Arc::new(Stats::default()));
        let b = a.clone();
        a.publish("k", 1).unwrap();
        b.publish("k", 2).unwrap();
        a.publish_wait("k", 3).await.unwrap();

        let seqs: Vec<u64> = vec![
            rx.recv().await.unwrap().seq,
            rx.recv().await.unwrap().seq,
            rx.recv().await.unwrap().seq,
        ];
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_receiver_closes_ingress() {
        let (tx, rx) = ingress::<&str, u32>(Some(4));
        let publisher = Publisher::new(tx, Arc::new(Stats::default()));
        drop(rx);
        assert!(publisher.is_closed());
        assert_matches!(publisher.publish("k", 1), Err(PublishError::Closed));
        assert_matches!(publisher.publish_wait("k", 1).await, Err(PublishError::Closed));
    }
}
