//! # Per-key output queue shared by every subscription on that key.
//!
//! One [`OutputQueue`] backs one registry entry. The dispatch loop is its only
//! writer; each attached [`Subscription`](crate::Subscription) is a reader with
//! its own cursor, so every reader sees every item written after it attached.
//!
//! ```text
//!   head                                    tail
//!    │                                        │
//!    ▼                                        ▼
//!   [ v0 ][ v1 ][ v2 ][ v3 ][ v4 ][ v5 ]
//!    ▲                  ▲                 ▲
//!  reader A           reader B          reader C (attached last, nothing unread)
//! ```
//!
//! ## Rules
//! - Items before the slowest cursor are trimmed; `buf.len()` is the slowest reader's backlog.
//! - The queue is **full** when that backlog reaches `capacity`; the overflow policy then decides.
//! - `DropOldest` pops the head; readers still pointing at it skip forward.
//! - A reader attaches at the tail and never sees earlier items.
//! - `close()` completes the queue: readers drain what is left, then observe the end.
//! - A push with no attached reader stores nothing (`NoReaders`).
//!
//! Wakeups use two [`Notify`]s. A `Notified` future is created before the state
//! is inspected, so a write or read racing the check is never missed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::error::TryRecvError;
use crate::policies::OverflowPolicy;

/// Capacity and overflow behavior applied to every queue a registry creates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct QueueConfig {
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
}

/// Outcome of a single [`OutputQueue::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Stored without touching existing items.
    Enqueued,
    /// Queue full under `DropNewest`; the incoming item was discarded.
    DroppedNewest,
    /// Queue full under `DropOldest`; the oldest item made room for the new one.
    EvictedOldest,
    /// Queue full under `RejectWrite`; the incoming item was refused.
    Rejected,
    /// Queue already completed.
    Closed,
    /// No reader attached; nothing stored.
    NoReaders,
}

struct State<V> {
    buf: VecDeque<V>,
    /// Absolute position of `buf[0]`.
    head: u64,
    /// Reader id → absolute position of its next item.
    cursors: HashMap<u64, u64>,
    next_reader: u64,
    closed: bool,
}

impl<V> State<V> {
    fn tail(&self) -> u64 {
        self.head + self.buf.len() as u64
    }

    /// Drops items every reader has consumed. Returns true when space was freed.
    fn trim(&mut self) -> bool {
        let before = self.buf.len();
        match self.cursors.values().min().copied() {
            Some(min) => {
                while self.head < min && self.buf.pop_front().is_some() {
                    self.head += 1;
                }
            }
            None => {
                self.head = self.tail();
                self.buf.clear();
            }
        }
        self.buf.len() < before
    }

    fn evict_oldest(&mut self) {
        if self.buf.pop_front().is_some() {
            self.head += 1;
            let head = self.head;
            for cursor in self.cursors.values_mut() {
                if *cursor < head {
                    *cursor = head;
                }
            }
        }
    }
}

/// Bounded or unbounded FIFO with one writer and cursor-based readers.
pub(crate) struct OutputQueue<V> {
    id: u64,
    cfg: QueueConfig,
    state: Mutex<State<V>>,
    readable: Notify,
    writable: Notify,
}

impl<V: Clone> OutputQueue<V> {
    pub(crate) fn new(id: u64, cfg: QueueConfig) -> Self {
        Self {
            id,
            cfg,
            state: Mutex::new(State {
                buf: VecDeque::new(),
                head: 0,
                cursors: HashMap::new(),
                next_reader: 0,
                closed: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Unique id; distinguishes this queue from later queues for the same key.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Registers a reader positioned at the tail.
    pub(crate) fn attach_reader(&self) -> u64 {
        let mut st = self.lock();
        let id = st.next_reader;
        st.next_reader += 1;
        let tail = st.tail();
        st.cursors.insert(id, tail);
        id
    }

    /// Removes a reader; its unread backlog no longer holds space.
    pub(crate) fn detach_reader(&self, reader: u64) {
        {
            let mut st = self.lock();
            st.cursors.remove(&reader);
            st.trim();
        }
        // Wake a blocked `Wait` push even if nothing was trimmed: with no
        // readers left it resolves to `NoReaders`.
        self.writable.notify_waiters();
    }

    /// Completes the queue. Idempotent.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Writes one item, applying the overflow policy when full.
    ///
    /// Only `Wait` suspends; it resumes when a reader frees space, detaches,
    /// or the queue is closed.
    pub(crate) async fn push(&self, item: V) -> Delivery {
        loop {
            let writable = self.writable.notified();
            {
                let mut st = self.lock();
                if st.closed {
                    return Delivery::Closed;
                }
                if st.cursors.is_empty() {
                    return Delivery::NoReaders;
                }
                let full = self.cfg.capacity.is_some_and(|cap| st.buf.len() >= cap);
                if !full {
                    st.buf.push_back(item);
                    drop(st);
                    self.readable.notify_waiters();
                    return Delivery::Enqueued;
                }
                match self.cfg.overflow {
                    OverflowPolicy::Wait => {}
                    OverflowPolicy::DropNewest => return Delivery::DroppedNewest,
                    OverflowPolicy::RejectWrite => return Delivery::Rejected,
                    OverflowPolicy::DropOldest => {
                        st.evict_oldest();
                        st.buf.push_back(item);
                        drop(st);
                        self.readable.notify_waiters();
                        return Delivery::EvictedOldest;
                    }
                }
            }
            writable.await;
        }
    }

    /// Takes the reader's next item without suspending.
    pub(crate) fn try_read(&self, reader: u64) -> Result<V, TryRecvError> {
        let (item, freed) = {
            let mut st = self.lock();
            let Some(pos) = st.cursors.get(&reader).copied() else {
                return Err(TryRecvError::Closed);
            };
            if pos >= st.tail() {
                return Err(if st.closed {
                    TryRecvError::Closed
                } else {
                    TryRecvError::Empty
                });
            }
            let item = st.buf[(pos - st.head) as usize].clone();
            st.cursors.insert(reader, pos + 1);
            (item, st.trim())
        };
        if freed {
            self.writable.notify_waiters();
        }
        Ok(item)
    }

    /// Takes the reader's next item, suspending while nothing is buffered.
    ///
    /// Returns `None` once the queue is closed and the reader has drained it.
    pub(crate) async fn read(&self, reader: u64) -> Option<V> {
        loop {
            let readable = self.readable.notified();
            match self.try_read(reader) {
                Ok(item) => return Some(item),
                Err(TryRecvError::Closed) => return None,
                Err(TryRecvError::Empty) => readable.await,
            }
        }
    }

    /// Items this reader has not consumed yet.
    pub(crate) fn pending(&self, reader: u64) -> usize {
        let st = self.lock();
        st.cursors
            .get(&reader)
            .map_or(0, |pos| (st.tail() - pos) as usize)
    }

    /// Snapshot of everything the slowest reader has yet to consume, oldest first.
    pub(crate) fn buffered(&self) -> Vec<V> {
        self.lock().buf.iter().cloned().collect()
    }
}
