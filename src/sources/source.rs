//! # Event source abstraction.
//!
//! A [`Source`] produces keyed events and hands them to a [`Publisher`]. It is
//! run by a reconnecting runner: returning `Err(SourceError::Fail)` schedules a
//! reconnect, `Ok(())` means the source is exhausted, `Err(Fatal)` stops it for good.
//!
//! Sources receive a [`CancellationToken`] and should return promptly once it fires.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Publisher;
use crate::error::SourceError;

/// # Asynchronous, cancellable producer of keyed events.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use keyfan::{Publisher, Source, SourceError};
///
/// struct Heartbeat;
///
/// #[async_trait]
/// impl Source<String, u64> for Heartbeat {
///     fn name(&self) -> &str { "heartbeat" }
///
///     async fn run(&self, publisher: Publisher<String, u64>, ctx: CancellationToken) -> Result<(), SourceError> {
///         if ctx.is_cancelled() {
///             return Err(SourceError::Canceled);
///         }
///         publisher
///             .publish("ops".to_string(), 1)
///             .map_err(|e| SourceError::fail(e.to_string()))
///     }
/// }
/// ```
#[async_trait]
pub trait Source<K, V>: Send + Sync + 'static {
    /// Stable, human-readable name used in events and logs.
    fn name(&self) -> &str;

    /// Connects and publishes until exhausted, failed, or cancelled.
    async fn run(&self, publisher: Publisher<K, V>, ctx: CancellationToken) -> Result<(), SourceError>;
}

/// Shared handle to a source.
pub type SourceRef<K, V> = Arc<dyn Source<K, V>>;

/// Publishes one event, waiting for ingress space but not past cancellation.
///
/// A closed ingress means the broker is stopping, reported as `Canceled`.
pub(crate) async fn forward<K, V>(
    publisher: &Publisher<K, V>,
    key: K,
    payload: V,
    ctx: &CancellationToken,
) -> Result<(), SourceError> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(SourceError::Canceled),
        res = publisher.publish_wait(key, payload) => res.map_err(|_| SourceError::Canceled),
    }
}
