//! # Broker: ingress, registry, dispatch loop and sources wired together.
//!
//! ```text
//!  Source ─► SourceActor ─┐
//!  Source ─► SourceActor ─┼─► Publisher ─► [ingress] ─► dispatch loop ─► Registry.lookup(key)
//!  app code ──────────────┘                                                   │
//!                                                              ┌──────────────┼──────────────┐
//!                                                              ▼              ▼              ▼
//!                                                        OutputQueue(k1) OutputQueue(k2)   (none: drop)
//!                                                           │     │          │
//!                                                        Sub A  Sub B      Sub C
//!
//!  Registry / dispatch / actors ── Event ──► Bus ──► observer listener ──► ObserverSet
//! ```
//!
//! ## Lifecycle
//! - `build()` creates everything; publishing before `start()` buffers in ingress.
//! - `start()` spawns the dispatch loop once; a second call fails with `AlreadyStarted`.
//! - `stop()` cancels dispatch and sources and closes ingress. Queues stay open so
//!   readers can drain what is buffered. The broker cannot be restarted.
//! - `close()` is `stop()` plus completing every queue.
//!
//! Dropping the last `Arc<Broker>` cancels dispatch and sources as well.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BrokerConfig;
use crate::core::builder::BrokerBuilder;
use crate::core::dispatch::Dispatcher;
use crate::core::publisher::{IngressRx, Publisher};
use crate::core::registry::{Registry, RouteKey};
use crate::core::shutdown;
use crate::core::stats::{Stats, StatsSnapshot};
use crate::core::subscription::Subscription;
use crate::error::{BrokerError, PublishError};
use crate::events::{Bus, Event, EventKind};
use crate::observers::ObserverSet;
use crate::sources::{SourceActor, SourceRef};

/// Keyed fan-out broker.
///
/// Shared through `Arc`; every method takes `&self`.
///
/// ## Example
/// ```rust
/// # async fn demo() -> Result<(), keyfan::BrokerError> {
/// use keyfan::{Broker, BrokerConfig};
///
/// let broker = Broker::<String, String>::builder(BrokerConfig::default()).build();
/// broker.start()?;
///
/// let mut alice = broker.subscribe("alice".to_string());
/// broker.publish("alice".to_string(), "deposit confirmed".to_string()).ok();
/// broker.publish("bob".to_string(), "nobody listening".to_string()).ok();
///
/// assert_eq!(alice.recv().await.as_deref(), Some("deposit confirmed"));
/// broker.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Broker<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    cfg: BrokerConfig,
    bus: Bus,
    stats: Arc<Stats>,
    registry: Arc<Registry<K, V>>,
    publisher: Publisher<K, V>,
    observers: Arc<ObserverSet>,

    ingress: Mutex<Option<IngressRx<K, V>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    dispatch_token: CancellationToken,
    sources_token: CancellationToken,
}

impl<K, V> Broker<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    /// Starts a builder with the given configuration.
    pub fn builder(cfg: BrokerConfig) -> BrokerBuilder<K, V> {
        BrokerBuilder::new(cfg)
    }

    /// Builds a broker without observers.
    pub fn new(cfg: BrokerConfig) -> Arc<Self> {
        BrokerBuilder::new(cfg).build()
    }

    pub(crate) fn from_parts(
        cfg: BrokerConfig,
        bus: Bus,
        stats: Arc<Stats>,
        registry: Arc<Registry<K, V>>,
        publisher: Publisher<K, V>,
        ingress: IngressRx<K, V>,
        observers: Arc<ObserverSet>,
    ) -> Self {
        Self {
            cfg,
            bus,
            stats,
            registry,
            publisher,
            observers,
            ingress: Mutex::new(Some(ingress)),
            dispatch: Mutex::new(None),
            dispatch_token: CancellationToken::new(),
            sources_token: CancellationToken::new(),
        }
    }

    /// Spawns the dispatch loop (and the observer listener, if any observers were configured).
    ///
    /// Must be called inside a tokio runtime. Fails with
    /// [`BrokerError::AlreadyStarted`] on the second call, including after `stop()`.
    pub fn start(&self) -> Result<(), BrokerError> {
        let rx = self
            .ingress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BrokerError::AlreadyStarted)?;

        if !self.observers.is_empty() {
            self.observer_listener();
        }

        let dispatcher = Dispatcher {
            registry: Arc::clone(&self.registry),
            stats: Arc::clone(&self.stats),
            bus: self.bus.clone(),
            mode: self.cfg.mode,
            overflow: self.cfg.overflow,
        };
        let handle = tokio::spawn(dispatcher.run(rx, self.dispatch_token.clone()));
        *self.dispatch.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Forwards bus events to the observer set (fire-and-forget).
    fn observer_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.observers);
        let token = self.dispatch_token.clone();
        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = token.cancelled() => break,
                    ev = rx.recv() => ev,
                };
                match ev {
                    Ok(ev) => set.emit(ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer listener lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Flush what was published up to the stop.
            while let Ok(ev) = rx.try_recv() {
                set.emit(ev);
            }
        });
    }

    /// Stops dispatch and sources, then closes ingress.
    ///
    /// Output queues stay open; buffered items remain readable. Returns
    /// [`BrokerError::DispatchPanicked`] if the loop ended abnormally.
    pub async fn stop(&self) -> Result<(), BrokerError> {
        self.sources_token.cancel();
        self.dispatch_token.cancel();
        // Never started: drop the receiver so publishers observe `Closed`.
        drop(self.ingress.lock().unwrap_or_else(PoisonError::into_inner).take());

        let handle = self.dispatch.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch task ended abnormally");
                return Err(BrokerError::DispatchPanicked);
            }
        }
        Ok(())
    }

    /// Stops the broker and completes every output queue.
    ///
    /// Subscribers drain what is buffered and then see the end of their stream.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let res = self.stop().await;
        self.registry.close_all();
        info!("broker closed");
        res
    }

    /// True while the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Publishes without waiting; see [`Publisher::publish`].
    pub fn publish(&self, key: K, payload: V) -> Result<(), PublishError> {
        self.publisher.publish(key, payload)
    }

    /// Cloneable publisher for producers living elsewhere.
    pub fn publisher(&self) -> Publisher<K, V> {
        self.publisher.clone()
    }

    /// Attaches a consumer to `key`.
    pub fn subscribe(&self, key: K) -> Subscription<K, V> {
        self.registry.subscribe(key)
    }

    /// Active handles for `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.registry.subscriber_count(key)
    }

    /// Number of keys with at least one subscriber.
    pub fn entry_count(&self) -> usize {
        self.registry.len()
    }

    /// Keys with at least one subscriber, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.registry.keys()
    }

    /// Items buffered for `key` and not yet read by its slowest subscriber.
    pub fn buffered(&self, key: &K) -> Vec<V> {
        self.registry
            .lookup(key)
            .map(|queue| queue.buffered())
            .unwrap_or_default()
    }

    /// Current delivery counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Receiver of runtime events published from now on.
    pub fn monitor(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Configuration the broker was built with.
    pub fn config(&self) -> &BrokerConfig {
        &self.cfg
    }

    fn actor(&self, source: SourceRef<K, V>) -> SourceActor<K, V> {
        SourceActor {
            source,
            publisher: self.publisher.clone(),
            backoff: self.cfg.reconnect,
            bus: self.bus.clone(),
        }
    }

    /// Runs `source` under the reconnecting runner until it completes, dies, or the broker stops.
    pub fn spawn_source(&self, source: SourceRef<K, V>) -> JoinHandle<()> {
        let actor = self.actor(source);
        tokio::spawn(actor.run(self.sources_token.child_token()))
    }

    /// Starts the broker and `sources`, then serves until a termination signal
    /// or until every source has finished.
    ///
    /// With no sources it serves until a signal. On a signal, sources are
    /// cancelled and given `cfg.grace` to stop; names of sources still running
    /// are reported in [`BrokerError::GraceExceeded`]. The broker is closed on return.
    pub async fn run_until_shutdown(&self, sources: Vec<SourceRef<K, V>>) -> Result<(), BrokerError> {
        self.start()?;
        let token = self.sources_token.child_token();
        let alive: Arc<Mutex<BTreeSet<String>>> = Arc::default();
        let mut set = JoinSet::new();

        for source in sources {
            let name = source.name().to_owned();
            alive
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.clone());
            let actor = self.actor(source);
            let child = token.child_token();
            let alive = Arc::clone(&alive);
            set.spawn(async move {
                actor.run(child).await;
                alive.lock().unwrap_or_else(PoisonError::into_inner).remove(&name);
            });
        }

        let served = tokio::select! {
            sig = shutdown::wait_for_shutdown_signal() => match sig {
                Ok(()) => {
                    info!("shutdown signal received");
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    token.cancel();
                    self.wait_all_with_grace(&mut set, &alive).await
                }
                Err(e) => Err(BrokerError::Signal(e)),
            },
            _ = async {
                if set.is_empty() {
                    std::future::pending::<()>().await;
                }
                while set.join_next().await.is_some() {}
            } => Ok(()),
        };

        set.abort_all();
        let closed = self.close().await;
        served.and(closed)
    }

    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<()>,
        alive: &Mutex<BTreeSet<String>>,
    ) -> Result<(), BrokerError> {
        let grace = self.cfg.grace;
        let done = async { while set.join_next().await.is_some() {} };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                self.bus.publish(Event::new(EventKind::GraceExceeded));
                let stuck: Vec<String> = alive
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .iter()
                    .cloned()
                    .collect();
                warn!(?grace, ?stuck, "sources did not stop within grace");
                Err(BrokerError::GraceExceeded { grace, stuck })
            }
        }
    }
}

impl<K, V> Drop for Broker<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.sources_token.cancel();
        self.dispatch_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::sources::SourceFn;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let broker = Broker::<String, u32>::new(BrokerConfig::default());
        broker.start().unwrap();
        assert_matches!(broker.start(), Err(BrokerError::AlreadyStarted));
        assert!(broker.is_running());
    }

    #[tokio::test]
    async fn stop_keeps_queues_readable_and_closes_ingress() {
        let broker = Broker::<String, u32>::new(BrokerConfig::default());
        broker.start().unwrap();
        let mut sub = broker.subscribe("k".into());
        broker.publish("k".into(), 1).unwrap();
        assert_eq!(sub.recv().await, Some(1));
        broker.publish("k".into(), 2).unwrap();
        while broker.buffered(&"k".to_string()).is_empty() {
            tokio::task::yield_now().await;
        }

        broker.stop().await.unwrap();
        assert!(!broker.is_running());
        assert_matches!(broker.publish("k".into(), 3), Err(PublishError::Closed));
        assert_matches!(broker.start(), Err(BrokerError::AlreadyStarted));

        assert_eq!(sub.recv().await, Some(2));
        assert!(!sub.is_closed());
    }

    #[tokio::test]
    async fn close_ends_every_subscription() {
        let broker = Broker::<String, u32>::new(BrokerConfig::default());
        broker.start().unwrap();
        let mut a = broker.subscribe("a".into());
        let mut b = broker.subscribe("b".into());
        broker.close().await.unwrap();

        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, None);
        assert_eq!(broker.entry_count(), 0);
    }

    #[tokio::test]
    async fn publish_before_start_is_buffered() {
        let broker = Broker::<String, u32>::new(BrokerConfig::default());
        let mut sub = broker.subscribe("k".into());
        broker.publish("k".into(), 7).unwrap();
        broker.start().unwrap();
        assert_eq!(sub.recv().await, Some(7));
    }

    #[tokio::test]
    async fn spawned_source_feeds_subscribers() {
        let broker = Broker::<String, u32>::new(BrokerConfig::default());
        broker.start().unwrap();
        let mut sub = broker.subscribe("feed".into());

        let source = SourceFn::arc(
            "counter",
            |publisher: Publisher<String, u32>, _ctx: CancellationToken| async move {
                for n in 0..3 {
                    publisher
                        .publish_wait("feed".into(), n)
                        .await
                        .map_err(|_| SourceError::Canceled)?;
                }
                Ok::<(), SourceError>(())
            },
        );
        broker.spawn_source(source).await.unwrap();

        for n in 0..3 {
            assert_eq!(sub.recv().await, Some(n));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn serve_loop_returns_when_sources_finish() {
        let broker = Broker::<String, u32>::new(BrokerConfig {
            grace: Duration::from_secs(1),
            ..BrokerConfig::default()
        });
        let mut sub = broker.subscribe("k".into());
        let source = SourceFn::arc(
            "once",
            |publisher: Publisher<String, u32>, _ctx: CancellationToken| async move {
                publisher
                    .publish_wait("k".into(), 42)
                    .await
                    .map_err(|_| SourceError::Canceled)
            },
        );

        broker.run_until_shutdown(vec![source]).await.unwrap();
        assert!(!broker.is_running());
        assert_eq!(broker.stats().published, 1);
        // The queue was completed by close: the handle drains to the end.
        while sub.recv().await.is_some() {}
        assert!(sub.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn grace_exceeded_reports_stuck_sources() {
        let broker = Broker::<String, u32>::new(BrokerConfig {
            grace: Duration::from_secs(2),
            ..BrokerConfig::default()
        });
        let mut events = broker.monitor();
        let alive = Mutex::new(BTreeSet::from(["stubborn".to_string()]));
        let mut set = JoinSet::new();
        set.spawn(tokio::time::sleep(Duration::from_secs(3600)));

        let err = broker.wait_all_with_grace(&mut set, &alive).await.unwrap_err();
        assert_matches!(
            err,
            BrokerError::GraceExceeded { grace, stuck } => {
                assert_eq!(grace, Duration::from_secs(2));
                assert_eq!(stuck, vec!["stubborn".to_string()]);
            }
        );
        assert_eq!(events.recv().await.unwrap().kind, EventKind::GraceExceeded);
        set.abort_all();
    }

    #[tokio::test(start_paused = true)]
    async fn all_sources_stopping_within_grace_is_reported() {
        let broker = Broker::<String, u32>::new(BrokerConfig {
            grace: Duration::from_secs(2),
            ..BrokerConfig::default()
        });
        let mut events = broker.monitor();
        let alive = Mutex::new(BTreeSet::new());
        let mut set = JoinSet::new();
        set.spawn(tokio::time::sleep(Duration::from_millis(500)));

        broker.wait_all_with_grace(&mut set, &alive).await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, EventKind::AllStoppedWithin);
    }
}
