//! # LogWriter: forwards runtime events to `tracing`.
//!
//! Lifecycle events go to `info`, drops and source failures to `warn`, observer
//! panics and dead sources to `error`. Per-delivery noise (overflow) is `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO keyfan: entry created key="u1"
//! WARN keyfan: source failed source="deposits" attempt=2 reason="connection reset"
//! INFO keyfan: reconnect scheduled source="deposits" delay_ms=5000
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::observers::Observe;

/// Observer that logs every runtime event through `tracing`.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Observe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let key = e.key.as_deref().unwrap_or("-");
        let source = e.source.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SubscriptionOpened => {
                debug!(target: "keyfan", key, subscribers = ?e.subscribers, "subscription opened");
            }
            EventKind::SubscriptionReleased => {
                debug!(target: "keyfan", key, subscribers = ?e.subscribers, "subscription released");
            }
            EventKind::EntryCreated => info!(target: "keyfan", key, "entry created"),
            EventKind::EntryRemoved => info!(target: "keyfan", key, "entry removed"),
            EventKind::DispatchStarted => info!(target: "keyfan", "dispatch started"),
            EventKind::DispatchStopped => info!(target: "keyfan", reason, "dispatch stopped"),
            EventKind::QueueOverflow => debug!(target: "keyfan", key, policy = reason, "queue overflow"),
            EventKind::WriteRejected => warn!(target: "keyfan", key, "write rejected"),
            EventKind::DeliveryClosed => debug!(target: "keyfan", key, "delivery to closed queue"),
            EventKind::SourceStarting => {
                info!(target: "keyfan", source, attempt = ?e.attempt, "source starting");
            }
            EventKind::SourceFailed => {
                warn!(target: "keyfan", source, attempt = ?e.attempt, reason, "source failed");
            }
            EventKind::ReconnectScheduled => {
                info!(target: "keyfan", source, delay_ms = ?e.delay_ms, "reconnect scheduled");
            }
            EventKind::SourceCompleted => info!(target: "keyfan", source, "source completed"),
            EventKind::SourceDead => error!(target: "keyfan", source, reason, "source stopped permanently"),
            EventKind::ShutdownRequested => info!(target: "keyfan", "shutdown requested"),
            EventKind::AllStoppedWithin => info!(target: "keyfan", "all sources stopped within grace"),
            EventKind::GraceExceeded => warn!(target: "keyfan", "grace exceeded"),
            EventKind::ObserverOverflow => warn!(target: "keyfan", observer = source, reason, "observer overflow"),
            EventKind::ObserverPanicked => error!(target: "keyfan", observer = source, reason, "observer panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
