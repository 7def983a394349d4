//! # Reconnect backoff for event sources.
//!
//! [`BackoffPolicy`] decides how long the source runner waits before
//! reconnecting a source that failed with a transient error.
//!
//! The delay for failure `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jittered. The base is derived from the failure count alone, so jitter
//! never feeds back into later delays.
//!
//! The default is a constant 5 s delay: a dropped upstream stream is retried
//! every five seconds until it comes back or the broker shuts down.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use keyfan::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(250),
//!     max: Duration::from_secs(4),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(250));
//! assert_eq!(backoff.next(2), Duration::from_secs(1));
//! assert_eq!(backoff.next(9), Duration::from_secs(4));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::jitter::JitterPolicy;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect.
    pub first: Duration,
    /// Upper bound for any reconnect delay.
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` = constant delay).
    pub factor: f64,
    /// Randomization applied to each delay.
    #[serde(default)]
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant 5 s reconnect delay, capped at 60 s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(5),
            max: Duration::from_secs(60),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay with no growth and no jitter.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay after `failures` consecutive failures (0-indexed).
    ///
    /// - `factor == 1.0` keeps the delay at `first` (up to `max`);
    /// - `factor > 1.0` grows exponentially up to `max`;
    /// - non-finite or negative intermediate values clamp to `max`.
    pub fn next(&self, failures: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = failures.min(i32::MAX as u32) as i32;
        let raw = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !raw.is_finite() || raw < 0.0 || raw > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(raw)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exp(first_ms: u64, max_ms: u64, jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_millis(max_ms),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn default_reconnects_every_five_seconds() {
        let policy = BackoffPolicy::default();
        for failures in [0, 1, 7, 100] {
            assert_eq!(policy.next(failures), Duration::from_secs(5));
        }
    }

    #[test]
    fn exponential_growth_until_cap() {
        let policy = exp(100, 1_000, JitterPolicy::None);
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(3), Duration::from_millis(800));
        assert_eq!(policy.next(4), Duration::from_millis(1_000));
    }

    #[test]
    fn first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn overflowing_exponent_clamps_to_max() {
        let policy = exp(100, 10_000, JitterPolicy::None);
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn equal_jitter_keeps_at_least_half() {
        let policy = exp(100, 30_000, JitterPolicy::Equal);
        for failures in 0..12 {
            let base_ms = (100.0 * 2.0f64.powi(failures as i32)).min(30_000.0);
            let delay = policy.next(failures);
            assert!(delay >= Duration::from_millis((base_ms / 2.0) as u64));
            assert!(delay <= Duration::from_millis(base_ms as u64));
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let policy = BackoffPolicy::constant(Duration::from_millis(800));
        let policy = BackoffPolicy {
            jitter: JitterPolicy::Full,
            ..policy
        };
        for failures in 0..50 {
            assert!(policy.next(failures) <= Duration::from_millis(800));
        }
    }

    #[test]
    fn decorrelated_stays_between_first_and_max() {
        let policy = exp(100, 30_000, JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(8);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
