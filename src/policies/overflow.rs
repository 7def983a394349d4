//! # Overflow (backpressure) policy for bounded output queues.
//!
//! Each per-key output queue is created with one [`OverflowPolicy`]. The policy
//! is consulted only when the queue is **bounded** and **full**, i.e. its
//! slowest attached subscription has `capacity` unread items.
//!
//! ## Variants
//! - `Wait`: the dispatch loop suspends until a reader frees space.
//! - `DropNewest`: the incoming item is discarded, the queue is unchanged.
//! - `DropOldest`: the oldest buffered item is evicted to make room.
//! - `RejectWrite`: the incoming item is discarded and reported as a rejection.
//!
//! ## Invariants
//! - Unbounded queues never consult the policy.
//! - `DropNewest` and `RejectWrite` leave identical queue contents; they differ
//!   only in how the drop is reported (`dropped_newest` vs `rejected` counters,
//!   `QueueOverflow` vs `WriteRejected` events).

use serde::{Deserialize, Serialize};

/// Policy controlling what happens to a new item when a bounded queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the dispatch loop until space frees.
    ///
    /// Use when:
    /// - Every event must reach connected consumers
    /// - Slowing ingestion for all keys is acceptable
    Wait,

    /// Discard the incoming item.
    ///
    /// Use when:
    /// - Consumers care about the earliest backlog
    /// - Example: audit trail where the first N entries matter
    DropNewest,

    /// Evict the oldest buffered item and enqueue the incoming one.
    ///
    /// Use when:
    /// - Only recent state matters
    /// - Example: live price or progress updates
    #[default]
    DropOldest,

    /// Discard the incoming item and report it as rejected.
    ///
    /// Same queue effect as [`OverflowPolicy::DropNewest`], but observable
    /// separately for monitoring.
    RejectWrite,
}

impl OverflowPolicy {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OverflowPolicy::Wait => "wait",
            OverflowPolicy::DropNewest => "drop_newest",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::RejectWrite => "reject_write",
        }
    }

    /// Returns `true` if the policy may suspend the writer.
    #[inline]
    pub fn is_blocking(&self) -> bool {
        matches!(self, OverflowPolicy::Wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_drop_oldest() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::DropOldest);
    }

    #[test]
    fn only_wait_blocks() {
        assert!(OverflowPolicy::Wait.is_blocking());
        assert!(!OverflowPolicy::DropNewest.is_blocking());
        assert!(!OverflowPolicy::DropOldest.is_blocking());
        assert!(!OverflowPolicy::RejectWrite.is_blocking());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&OverflowPolicy::RejectWrite).unwrap();
        assert_eq!(json, "\"reject_write\"");
        let back: OverflowPolicy = serde_json::from_str("\"drop_newest\"").unwrap();
        assert_eq!(back, OverflowPolicy::DropNewest);
    }
}
