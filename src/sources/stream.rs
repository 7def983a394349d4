//! # Stream-backed source (`StreamSource`).
//!
//! Adapts any `futures::Stream` of `Result<(K, V), SourceError>`: a streaming
//! RPC, a message-queue consumer, a websocket reader. The factory is called once
//! per connection attempt, so a reconnect opens a fresh stream.
//!
//! ```text
//! factory() ─► stream ─► Ok((k, v))  → publish_wait
//!                     ─► Err(e)      → run ends with e (Fail → reconnect)
//!                     ─► end         → Ok(()), or Fail("stream ended") with reconnect_on_end
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::core::Publisher;
use crate::error::SourceError;
use crate::sources::source::{Source, forward};

/// Source reading from a freshly created stream per connection.
pub struct StreamSource<F> {
    name: Cow<'static, str>,
    factory: F,
    reconnect_on_end: bool,
}

impl<F> StreamSource<F> {
    /// Creates a source that completes when the stream ends.
    pub fn new(name: impl Into<Cow<'static, str>>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
            reconnect_on_end: false,
        }
    }

    /// Treats the end of the stream as a disconnect to recover from.
    ///
    /// Suits server-push streams that should never end.
    pub fn reconnect_on_end(mut self) -> Self {
        self.reconnect_on_end = true;
        self
    }

    /// Wraps the source in an `Arc`.
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl<K, V, F, S> Source<K, V> for StreamSource<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn() -> S + Send + Sync + 'static,
    S: Stream<Item = Result<(K, V), SourceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, publisher: Publisher<K, V>, ctx: CancellationToken) -> Result<(), SourceError> {
        let stream = (self.factory)();
        futures::pin_mut!(stream);

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(SourceError::Canceled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok((key, payload))) => forward(&publisher, key, payload, &ctx).await?,
                Some(Err(e)) => return Err(e),
                None if self.reconnect_on_end => return Err(SourceError::fail("stream ended")),
                None => return Ok(()),
            }
        }
    }
}
