//! # Closure-backed source (`SourceFn`).
//!
//! [`SourceFn`] wraps `F: Fn(Publisher, CancellationToken) -> Fut` and builds a
//! fresh future per connection attempt. State shared across reconnects must be
//! captured explicitly (e.g. an `Arc`).
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use keyfan::{Publisher, SourceFn, SourceRef, SourceError};
//!
//! let src: SourceRef<String, String> = SourceFn::arc(
//!     "greeter",
//!     |publisher: Publisher<String, String>, _ctx: CancellationToken| async move {
//!         publisher
//!             .publish_wait("u1".into(), "hello".into())
//!             .await
//!             .map_err(|_| SourceError::Canceled)
//!     },
//! );
//! assert_eq!(src.name(), "greeter");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Publisher;
use crate::error::SourceError;
use crate::sources::Source;

/// Function-backed source.
#[derive(Debug)]
pub struct SourceFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> SourceFn<F> {
    /// Creates a closure-backed source.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the source and wraps it in an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<K, V, F, Fut> Source<K, V> for SourceFn<F>
where
    K: Send + 'static,
    V: Send + 'static,
    F: Fn(Publisher<K, V>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SourceError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, publisher: Publisher<K, V>, ctx: CancellationToken) -> Result<(), SourceError> {
        (self.f)(publisher, ctx).await
    }
}
