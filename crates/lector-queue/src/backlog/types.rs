//! Backlog item types (internal implementation).

use std::cmp::Reverse;

use lector_core::{Priority, SynthesisRequest};

/// Ordering key for pending items.
///
/// Sorted ascending by priority, then by *descending* insertion sequence.
/// The last key is therefore the most urgent, oldest item, and the first key
/// is the least urgent, newest item (the overflow victim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    pub priority: Priority,
    pub seq: Reverse<u64>,
}

impl OrderKey {
    pub const fn new(priority: Priority, seq: u64) -> Self {
        Self {
            priority,
            seq: Reverse(seq),
        }
    }
}

/// A request together with everyone waiting on it.
///
/// `W` is the waiter handle; the orchestrator uses oneshot senders, tests
/// use plain values.
#[derive(Debug)]
pub struct BacklogEntry<W> {
    pub request: SynthesisRequest,
    pub waiters: Vec<W>,
}

impl<W> BacklogEntry<W> {
    pub fn new(request: SynthesisRequest, waiters: Vec<W>) -> Self {
        Self { request, waiters }
    }
}

/// An entry parked until its retry delay elapses.
#[derive(Debug)]
pub struct ParkedEntry<W> {
    /// Identifies this particular park; a stale wake-up carries a different one.
    pub token: u64,
    pub entry: BacklogEntry<W>,
}
