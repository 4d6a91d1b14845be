//! Synthesis backlog state machine.
//!
//! Pure synchronous bookkeeping for requests that are waiting: either
//! pending dispatch, or parked until a retry delay elapses. No I/O, no
//! timers and no logging; `RequestQueue` owns those.
//!
//! # Ordering
//!
//! - Higher priority first
//! - FIFO among equal priorities
//! - When over capacity, the lowest priority item goes first, newest among
//!   equals

mod types;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use lector_core::{Priority, RequestKey, SynthesisRequest};

pub use types::{BacklogEntry, OrderKey, ParkedEntry};

/// Pending and backing-off synthesis requests.
///
/// This is a sync type with no internal locking; the caller is responsible
/// for synchronization. Each key appears at most once across both sets.
pub struct SynthesisBacklog<W> {
    pending: BTreeMap<OrderKey, BacklogEntry<W>>,
    index: HashMap<RequestKey, OrderKey>,
    backing_off: HashMap<RequestKey, ParkedEntry<W>>,
    next_seq: u64,
    max_size: usize,
}

impl<W> SynthesisBacklog<W> {
    /// Create a backlog holding at most `max_size` pending items.
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: BTreeMap::new(),
            index: HashMap::new(),
            backing_off: HashMap::new(),
            next_seq: 0,
            max_size,
        }
    }

    /// Capacity of the pending set.
    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the capacity. Takes effect at the next [`Self::enforce_capacity`].
    pub const fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    /// Number of items waiting for dispatch.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of items waiting out a retry delay.
    pub fn backing_off_len(&self) -> usize {
        self.backing_off.len()
    }

    /// Whether a key is pending or backing off.
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.index.contains_key(key) || self.backing_off.contains_key(key)
    }

    /// Age of the request held for `key`, if any.
    pub fn age_of(&self, key: &RequestKey) -> Option<Duration> {
        self.entry(key).map(|entry| entry.request.age())
    }

    /// Attach a waiter to an existing request.
    ///
    /// A pending request is promoted if `priority` is more urgent than its
    /// own. Hands the waiter back when the key is unknown.
    pub fn attach(&mut self, key: &RequestKey, waiter: W, priority: Priority) -> Result<(), W> {
        if !self.promote(key, priority) {
            return Err(waiter);
        }
        match self.entry_mut(key) {
            Some(entry) => {
                entry.waiters.push(waiter);
                Ok(())
            }
            None => Err(waiter),
        }
    }

    /// Raise a waiting request to `priority`. Never demotes.
    ///
    /// Returns whether the key is pending or backing off.
    pub fn promote(&mut self, key: &RequestKey, priority: Priority) -> bool {
        if let Some(parked) = self.backing_off.get_mut(key) {
            parked.entry.request.priority = parked.entry.request.priority.max(priority);
            return true;
        }

        let Some(order) = self.index.get(key).copied() else {
            return false;
        };
        if priority <= order.priority {
            return true;
        }
        let Some(mut entry) = self.pending.remove(&order) else {
            self.index.remove(key);
            return false;
        };

        // Keep the original sequence so FIFO among equals still holds
        entry.request.priority = priority;
        let order = OrderKey::new(priority, order.seq.0);
        self.index.insert(key.clone(), order);
        self.pending.insert(order, entry);
        true
    }

    /// Insert a new request and trim to capacity.
    ///
    /// Returns the entries dropped to make room, which may include the one
    /// just inserted when it is the least urgent.
    pub fn insert(&mut self, entry: BacklogEntry<W>) -> Vec<BacklogEntry<W>> {
        let key = entry.request.key.clone();
        if let Some(previous) = self.index.remove(&key) {
            self.pending.remove(&previous);
        }

        let order = OrderKey::new(entry.request.priority, self.next_seq);
        self.next_seq += 1;
        self.index.insert(key, order);
        self.pending.insert(order, entry);

        self.enforce_capacity()
    }

    /// Drop the least urgent pending items until within capacity.
    pub fn enforce_capacity(&mut self) -> Vec<BacklogEntry<W>> {
        let mut dropped = Vec::new();
        while self.pending.len() > self.max_size {
            let Some((_, entry)) = self.pending.pop_first() else {
                break;
            };
            self.index.remove(&entry.request.key);
            dropped.push(entry);
        }
        dropped
    }

    /// Take the most urgent pending item.
    pub fn pop(&mut self) -> Option<BacklogEntry<W>> {
        let (_, entry) = self.pending.pop_last()?;
        self.index.remove(&entry.request.key);
        Some(entry)
    }

    /// Move an entry to the backing-off set under `token`.
    pub fn park(&mut self, entry: BacklogEntry<W>, token: u64) {
        let key = entry.request.key.clone();
        if let Some(order) = self.index.remove(&key) {
            self.pending.remove(&order);
        }
        self.backing_off.insert(key, ParkedEntry { token, entry });
    }

    /// Take a parked entry back out, if it is still parked under `token`.
    pub fn unpark(&mut self, key: &RequestKey, token: u64) -> Option<BacklogEntry<W>> {
        if self.backing_off.get(key)?.token != token {
            return None;
        }
        self.backing_off.remove(key).map(|parked| parked.entry)
    }

    /// Remove a key from either set.
    pub fn remove(&mut self, key: &RequestKey) -> Option<BacklogEntry<W>> {
        if let Some(order) = self.index.remove(key) {
            return self.pending.remove(&order);
        }
        self.backing_off.remove(key).map(|parked| parked.entry)
    }

    /// Remove every entry of one book from both sets.
    pub fn drain_book(&mut self, book_id: &str) -> Vec<BacklogEntry<W>> {
        let keys: Vec<RequestKey> = self
            .index
            .keys()
            .chain(self.backing_off.keys())
            .filter(|key| key.is_for_book(book_id))
            .cloned()
            .collect();
        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Remove everything.
    pub fn drain_all(&mut self) -> Vec<BacklogEntry<W>> {
        self.index.clear();
        let pending = std::mem::take(&mut self.pending).into_values();
        let parked = self.backing_off.drain().map(|(_, parked)| parked.entry);
        pending.chain(parked).collect()
    }

    fn entry(&self, key: &RequestKey) -> Option<&BacklogEntry<W>> {
        if let Some(order) = self.index.get(key) {
            return self.pending.get(order);
        }
        self.backing_off.get(key).map(|parked| &parked.entry)
    }

    fn entry_mut(&mut self, key: &RequestKey) -> Option<&mut BacklogEntry<W>> {
        if let Some(parked) = self.backing_off.get_mut(key) {
            return Some(&mut parked.entry);
        }
        let order = self.index.get(key)?;
        self.pending.get_mut(order)
    }
}

impl<W> Default for SynthesisBacklog<W> {
    fn default() -> Self {
        Self::new(lector_core::settings::DEFAULT_MAX_QUEUE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fragment: &str, priority: Priority) -> SynthesisRequest {
        SynthesisRequest::new(RequestKey::new("book", fragment), fragment, priority)
    }

    fn entry(fragment: &str, priority: Priority, waiter: u32) -> BacklogEntry<u32> {
        BacklogEntry::new(request(fragment, priority), vec![waiter])
    }

    fn fragment_of(entry: &BacklogEntry<u32>) -> &str {
        &entry.request.key.fragment_id
    }

    #[test]
    fn test_pops_highest_priority_first() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 1, 0));
        backlog.insert(entry("b", 5, 0));
        backlog.insert(entry("c", 3, 0));

        let order: Vec<_> = std::iter::from_fn(|| backlog.pop())
            .map(|e| e.request.priority)
            .collect();
        assert_eq!(order, vec![5, 3, 1]);
    }

    #[test]
    fn test_equal_priorities_are_fifo() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("first", 2, 0));
        backlog.insert(entry("second", 2, 0));
        backlog.insert(entry("third", 2, 0));

        assert_eq!(fragment_of(&backlog.pop().unwrap()), "first");
        assert_eq!(fragment_of(&backlog.pop().unwrap()), "second");
        assert_eq!(fragment_of(&backlog.pop().unwrap()), "third");
        assert!(backlog.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_lowest_priority_newest() {
        let mut backlog = SynthesisBacklog::new(2);
        assert!(backlog.insert(entry("old-low", 1, 0)).is_empty());
        assert!(backlog.insert(entry("high", 9, 0)).is_empty());

        let dropped = backlog.insert(entry("new-low", 1, 0));
        assert_eq!(dropped.len(), 1);
        assert_eq!(fragment_of(&dropped[0]), "new-low");
        assert_eq!(backlog.pending_len(), 2);
        assert!(!backlog.contains(&RequestKey::new("book", "new-low")));
    }

    #[test]
    fn test_shrinking_capacity_applies_on_enforce() {
        let mut backlog = SynthesisBacklog::new(5);
        for (i, priority) in [4, 2, 8, 1].into_iter().enumerate() {
            backlog.insert(entry(&format!("f{i}"), priority, 0));
        }

        backlog.set_max_size(2);
        assert_eq!(backlog.pending_len(), 4);

        let dropped: Vec<_> = backlog
            .enforce_capacity()
            .iter()
            .map(|e| e.request.priority)
            .collect();
        assert_eq!(dropped, vec![1, 2]);
        assert_eq!(backlog.pending_len(), 2);
    }

    #[test]
    fn test_attach_collects_waiters_and_promotes() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 1, 10));
        backlog.insert(entry("b", 3, 20));

        let key = RequestKey::new("book", "a");
        assert!(backlog.attach(&key, 11, 7).is_ok());
        assert_eq!(backlog.attach(&RequestKey::new("book", "zzz"), 99, 0), Err(99));

        let first = backlog.pop().unwrap();
        assert_eq!(fragment_of(&first), "a");
        assert_eq!(first.request.priority, 7);
        assert_eq!(first.waiters, vec![10, 11]);
    }

    #[test]
    fn test_promote_reorders_without_adding_waiters() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("prefetched", 1, 10));
        backlog.insert(entry("window", 5, 20));

        let key = RequestKey::new("book", "prefetched");
        assert!(backlog.promote(&key, 10));
        assert!(backlog.promote(&key, 2), "lower priority is a no-op, not a miss");
        assert!(!backlog.promote(&RequestKey::new("book", "zzz"), 10));

        let first = backlog.pop().unwrap();
        assert_eq!(fragment_of(&first), "prefetched");
        assert_eq!(first.request.priority, 10);
        assert_eq!(first.waiters, vec![10]);
    }

    #[test]
    fn test_attach_never_demotes() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 5, 1));
        backlog.attach(&RequestKey::new("book", "a"), 2, 1).unwrap();
        assert_eq!(backlog.pop().unwrap().request.priority, 5);
    }

    #[test]
    fn test_park_and_unpark_with_token() {
        let mut backlog = SynthesisBacklog::new(10);
        let key = RequestKey::new("book", "a");
        backlog.park(entry("a", 1, 0), 7);

        assert!(backlog.contains(&key));
        assert_eq!(backlog.backing_off_len(), 1);
        assert_eq!(backlog.pending_len(), 0);
        assert!(backlog.attach(&key, 1, 0).is_ok());

        // Wrong token: a stale wake-up
        assert!(backlog.unpark(&key, 6).is_none());

        let unparked = backlog.unpark(&key, 7).unwrap();
        assert_eq!(unparked.waiters, vec![0, 1]);
        assert!(!backlog.contains(&key));
    }

    #[test]
    fn test_remove_from_either_set() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("pending", 1, 0));
        backlog.park(entry("parked", 1, 0), 1);

        assert!(backlog.remove(&RequestKey::new("book", "pending")).is_some());
        assert!(backlog.remove(&RequestKey::new("book", "parked")).is_some());
        assert!(backlog.remove(&RequestKey::new("book", "pending")).is_none());
        assert_eq!(backlog.pending_len() + backlog.backing_off_len(), 0);
    }

    #[test]
    fn test_drain_book_only_touches_that_book() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 1, 0));
        backlog.park(entry("b", 1, 0), 1);
        backlog.insert(BacklogEntry::new(
            SynthesisRequest::new(RequestKey::new("other", "a"), "a", 1),
            vec![0],
        ));

        let drained = backlog.drain_book("book");
        assert_eq!(drained.len(), 2);
        assert_eq!(backlog.pending_len(), 1);
        assert!(backlog.contains(&RequestKey::new("other", "a")));
    }

    #[test]
    fn test_drain_all_empties_everything() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 1, 0));
        backlog.park(entry("b", 1, 0), 1);

        assert_eq!(backlog.drain_all().len(), 2);
        assert_eq!(backlog.pending_len(), 0);
        assert_eq!(backlog.backing_off_len(), 0);
        assert!(backlog.pop().is_none());
    }

    #[test]
    fn test_age_of_known_keys_only() {
        let mut backlog = SynthesisBacklog::new(10);
        backlog.insert(entry("a", 1, 0));
        assert!(backlog.age_of(&RequestKey::new("book", "a")).is_some());
        assert!(backlog.age_of(&RequestKey::new("book", "b")).is_none());
    }
}
