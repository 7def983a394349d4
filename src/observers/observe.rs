//! # Observer trait.
//!
//! [`Observe`] is the extension point for plugging monitoring into the broker:
//! logging, metrics export, alerting. Observers see runtime [`Event`]s, never
//! routed payloads.
//!
//! Each observer gets:
//! - a **dedicated worker task**,
//! - a **bounded queue** (capacity via [`Observe::queue_capacity`]),
//! - **panic isolation** (panics are reported as `EventKind::ObserverPanicked`).
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use keyfan::{Event, EventKind, Observe};
//!
//! #[derive(Default)]
//! struct RejectCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Observe for RejectCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WriteRejected {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "reject-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Runtime event observer.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing only fills this observer's own queue.
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per observer.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic reports. Override the verbose default.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
