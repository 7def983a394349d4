//! # Broker configuration.
//!
//! Provides [`BrokerConfig`] centralized settings for a [`Broker`](crate::Broker)
//! and [`DeliveryMode`].
//!
//! ## Sentinel values
//! - `ingress_capacity = 0` → unbounded ingress (`publish` never returns `Full`)
//! - `queue_capacity = 0` → unbounded per-key queues (the overflow policy is never consulted)
//!
//! Unbounded queues let a stalled consumer grow memory without limit. That is
//! the caller's risk to take.
//!
//! ## Loading
//! ```rust
//! use keyfan::{BrokerConfig, DeliveryMode, OverflowPolicy};
//!
//! let cfg = BrokerConfig::from_json(r#"{ "queue_capacity": 3, "overflow": "drop_newest" }"#).unwrap();
//! assert_eq!(cfg.queue_limit(), Some(3));
//! assert_eq!(cfg.overflow, OverflowPolicy::DropNewest);
//! assert_eq!(cfg.mode, DeliveryMode::Keyed);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, OverflowPolicy};

/// How the dispatch loop picks target queues for an envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Deliver to the queue registered under the envelope's key only.
    #[default]
    Keyed,
    /// Deliver to every registered queue; the envelope key is ignored and
    /// registry keys identify connected clients.
    Broadcast,
}

/// Configuration for a broker instance.
///
/// ## Field semantics
/// - `ingress_capacity`: ingress buffer between publishers and dispatch (`0` = unbounded)
/// - `queue_capacity`: per-key output queue capacity (`0` = unbounded)
/// - `overflow`: behavior of a full bounded output queue
/// - `mode`: keyed or broadcast delivery
/// - `bus_capacity`: telemetry bus ring size (min 1; clamped by Bus)
/// - `reconnect`: default backoff for sources after transient failures
/// - `grace`: how long `run_until_shutdown` waits for sources to stop
///
/// All fields are public. Prefer the helper accessors over checking the `0`
/// sentinels directly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Ingress channel capacity.
    pub ingress_capacity: usize,

    /// Per-key output queue capacity, counted against the slowest reader.
    pub queue_capacity: usize,

    /// What a full bounded output queue does with an incoming item.
    ///
    /// Defaults to `DropOldest`: a stalled consumer loses its oldest backlog
    /// instead of stalling delivery for every other key.
    pub overflow: OverflowPolicy,

    /// Keyed or broadcast delivery.
    pub mode: DeliveryMode,

    /// Capacity of the telemetry bus broadcast channel.
    ///
    /// Observers lagging more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,

    /// Reconnect backoff used by source runners.
    pub reconnect: BackoffPolicy,

    /// Maximum wait for sources to stop once shutdown begins.
    pub grace: Duration,
}

impl BrokerConfig {
    /// Parses a JSON document (missing fields take their defaults) and validates it.
    pub fn from_json(doc: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(doc)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks values the broker cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.reconnect.factor.is_finite() || self.reconnect.factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "reconnect.factor",
                reason: format!("must be a finite number >= 1.0, got {}", self.reconnect.factor),
            });
        }
        if self.reconnect.first > self.reconnect.max {
            return Err(ConfigError::Invalid {
                field: "reconnect.first",
                reason: format!(
                    "{:?} is larger than reconnect.max {:?}",
                    self.reconnect.first, self.reconnect.max
                ),
            });
        }
        Ok(())
    }

    /// Returns the ingress bound as an `Option`.
    ///
    /// - `None` → unbounded ingress
    /// - `Some(n)` → `publish` fails with `Full` once `n` envelopes wait
    #[inline]
    pub fn ingress_limit(&self) -> Option<usize> {
        if self.ingress_capacity == 0 {
            None
        } else {
            Some(self.ingress_capacity)
        }
    }

    /// Returns the per-key queue bound as an `Option`.
    #[inline]
    pub fn queue_limit(&self) -> Option<usize> {
        if self.queue_capacity == 0 {
            None
        } else {
            Some(self.queue_capacity)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for BrokerConfig {
    /// Default configuration:
    ///
    /// - `ingress_capacity = 1024`
    /// - `queue_capacity = 1024`
    /// - `overflow = DropOldest`
    /// - `mode = Keyed`
    /// - `bus_capacity = 1024`
    /// - `reconnect = BackoffPolicy::default()` (constant 5 s)
    /// - `grace = 30s`
    fn default() -> Self {
        Self {
            ingress_capacity: 1024,
            queue_capacity: 1024,
            overflow: OverflowPolicy::default(),
            mode: DeliveryMode::default(),
            bus_capacity: 1024,
            reconnect: BackoffPolicy::default(),
            grace: Duration::from_secs(30),
        }
    }
}
