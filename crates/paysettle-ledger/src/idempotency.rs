//! Replay guard for externally keyed operations.
//!
//! Deposits carry a caller-supplied reference id and payroll runs are keyed
//! by `(contract, period)`. Each key may be claimed once; a second claim is
//! refused so the caller can surface a conflict instead of moving money twice.
//!
//! The guard is bounded with oldest-first eviction so memory stays
//! predictable in a long-running daemon.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Bounded, insertion-ordered set of claimed keys.
#[derive(Debug)]
pub struct IdempotencyGuard<K> {
    claimed: HashSet<K>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<K>,
    max_size: usize,
}

impl<K: Eq + Hash + Clone> IdempotencyGuard<K> {
    /// Create a new guard with the given maximum size.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "IdempotencyGuard max_size must be > 0");
        Self {
            claimed: HashSet::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    /// Claim `key`. Returns `false` if it was already claimed.
    pub fn claim(&mut self, key: K) -> bool {
        if self.claimed.contains(&key) {
            return false;
        }

        // Evict oldest if at capacity.
        if self.claimed.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.claimed.remove(&oldest);
            }
        }

        self.claimed.insert(key.clone());
        self.order.push_back(key);
        true
    }

    /// Give a key back after the guarded operation failed, so it can be retried.
    pub fn release(&mut self, key: &K) {
        if self.claimed.remove(key) {
            self.order.retain(|k| k != key);
        }
    }

    pub fn is_claimed(&self, key: &K) -> bool {
        self.claimed.contains(key)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
