//! Error types used by the broker runtime, publishers and event sources.
//!
//! - [`BrokerError`]: errors raised by the broker lifecycle itself.
//! - [`PublishError`]: an envelope could not be handed to the ingress stream.
//! - [`SourceError`]: errors raised by a single [`Source`](crate::Source) run.
//! - [`ConfigError`]: configuration could not be parsed or is inconsistent.
//! - [`TryRecvError`]: non-suspending read on a [`Subscription`](crate::Subscription).
//!
//! Every enum provides `as_label()` returning a short stable snake_case label
//! for logs and metrics.
//!
//! "No subscriber for this key" is never an error anywhere in this crate.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the broker runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// `start()` was called on a broker whose dispatch loop was already started.
    #[error("dispatch loop already started")]
    AlreadyStarted,

    /// The dispatch task terminated abnormally (panic or abort).
    #[error("dispatch loop panicked")]
    DispatchPanicked,

    /// Shutdown grace period was exceeded; some sources did not stop in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of sources that did not stop in time.
        stuck: Vec<String>,
    },

    /// OS signal listeners could not be installed.
    #[error("failed to install shutdown signal handler: {0}")]
    Signal(#[from] std::io::Error),
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use keyfan::BrokerError;
    ///
    /// assert_eq!(BrokerError::AlreadyStarted.as_label(), "broker_already_started");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::AlreadyStarted => "broker_already_started",
            BrokerError::DispatchPanicked => "broker_dispatch_panicked",
            BrokerError::GraceExceeded { .. } => "broker_grace_exceeded",
            BrokerError::Signal(_) => "broker_signal",
        }
    }
}

/// Error returned when an envelope cannot enter the ingress stream.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishError {
    /// Bounded ingress is at capacity (retry later or use `publish_wait`).
    #[error("ingress queue full")]
    Full,

    /// The broker was stopped and the ingress stream is closed.
    #[error("ingress closed")]
    Closed,
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::Full => "publish_full",
            PublishError::Closed => "publish_closed",
        }
    }
}

/// # Errors produced by an event source run.
///
/// `Fail` is transient: the source runner reconnects after a backoff delay.
/// `Fatal` stops the source permanently. `Canceled` is a graceful exit.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source failed or disconnected but may succeed if reconnected.
    #[error("source failed: {reason}")]
    Fail {
        /// The underlying error message.
        reason: String,
    },

    /// Non-recoverable error (the source is not reconnected).
    #[error("fatal source error (no reconnect): {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },

    /// The source observed cancellation and stopped.
    #[error("context cancelled")]
    Canceled,
}

impl SourceError {
    /// Shorthand for a transient failure.
    pub fn fail(reason: impl Into<String>) -> Self {
        SourceError::Fail {
            reason: reason.into(),
        }
    }

    /// Shorthand for a fatal failure.
    pub fn fatal(reason: impl Into<String>) -> Self {
        SourceError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use keyfan::SourceError;
    ///
    /// assert_eq!(SourceError::fail("reset by peer").as_label(), "source_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceError::Fail { .. } => "source_failed",
            SourceError::Fatal { .. } => "source_fatal",
            SourceError::Canceled => "source_canceled",
        }
    }

    /// Indicates whether the source should be reconnected after this error.
    ///
    /// ```
    /// use keyfan::SourceError;
    ///
    /// assert!(SourceError::fail("eof").is_retryable());
    /// assert!(!SourceError::fatal("bad credentials").is_retryable());
    /// assert!(!SourceError::Canceled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Fail { .. })
    }
}

/// Configuration loading and validation errors.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The document is not valid JSON for [`BrokerConfig`](crate::BrokerConfig).
    #[error("invalid broker config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the broker cannot honor.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Offending field name.
        field: &'static str,
        /// Why the value was refused.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// Error returned by [`Subscription::try_recv`](crate::Subscription::try_recv).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// Nothing buffered for this subscription right now.
    #[error("subscription queue empty")]
    Empty,

    /// The queue was completed and every buffered item has been read.
    #[error("subscription queue closed")]
    Closed,
}
