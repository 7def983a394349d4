use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::core::broker::Broker;
use crate::core::publisher::{Publisher, ingress};
use crate::core::queue::QueueConfig;
use crate::core::registry::{Registry, RouteKey};
use crate::core::stats::Stats;
use crate::events::Bus;
use crate::observers::{Observe, ObserverSet};

/// Builder for a [`Broker`] with optional observers.
pub struct BrokerBuilder<K, V> {
    cfg: BrokerConfig,
    observers: Vec<Arc<dyn Observe>>,
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> BrokerBuilder<K, V>
where
    K: RouteKey,
    V: Clone + Send + 'static,
{
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: BrokerConfig) -> Self {
        Self {
            cfg,
            observers: Vec::new(),
            _types: PhantomData,
        }
    }

    /// Sets runtime observers.
    ///
    /// Each observer gets its own worker and bounded queue; see [`ObserverSet`].
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Adds the built-in `tracing` observer.
    #[cfg(feature = "logging")]
    pub fn with_logging(mut self) -> Self {
        self.observers.push(Arc::new(crate::observers::LogWriter::new()));
        self
    }

    /// Builds the broker. Call [`Broker::start`] to begin dispatching.
    ///
    /// Must be called inside a tokio runtime when observers are configured.
    pub fn build(self) -> Arc<Broker<K, V>> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let observers = Arc::new(ObserverSet::new(self.observers, bus.clone()));
        let stats = Arc::new(Stats::default());

        let registry = Arc::new(Registry::new(
            QueueConfig {
                capacity: self.cfg.queue_limit(),
                overflow: self.cfg.overflow,
            },
            bus.clone(),
        ));
        let (tx, rx) = ingress(self.cfg.ingress_limit());
        let publisher = Publisher::new(tx, Arc::clone(&stats));

        Arc::new(Broker::from_parts(
            self.cfg, bus, stats, registry, publisher, rx, observers,
        ))
    }
}
