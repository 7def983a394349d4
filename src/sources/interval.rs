//! # Timer-driven source (`IntervalSource`).
//!
//! Calls a producer closure every `period`; `Some((key, payload))` is published,
//! `None` skips the tick. Missed ticks are delayed, not bursted.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::Publisher;
use crate::error::SourceError;
use crate::sources::source::{Source, forward};

/// Source emitting on a fixed period.
pub struct IntervalSource<F> {
    name: Cow<'static, str>,
    period: Duration,
    produce: F,
    limit: Option<u64>,
}

impl<F> IntervalSource<F> {
    /// Creates a source ticking every `period` (clamped to at least 1 ms).
    pub fn new(name: impl Into<Cow<'static, str>>, period: Duration, produce: F) -> Self {
        Self {
            name: name.into(),
            period: period.max(Duration::from_millis(1)),
            produce,
            limit: None,
        }
    }

    /// Completes after `ticks` ticks per run.
    pub fn with_limit(mut self, ticks: u64) -> Self {
        self.limit = Some(ticks);
        self
    }

    /// Wraps the source in an `Arc`.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl<K, V, F> Source<K, V> for IntervalSource<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn() -> Option<(K, V)> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, publisher: Publisher<K, V>, ctx: CancellationToken) -> Result<(), SourceError> {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        loop {
            if self.limit.is_some_and(|limit| ticks >= limit) {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SourceError::Canceled),
                _ = ticker.tick() => {}
            }
            ticks += 1;
            if let Some((key, payload)) = (self.produce)() {
                forward(&publisher, key, payload, &ctx).await?;
            }
        }
    }
}
