//! Bounded LRU cache of heavy per-package compiler artifacts.
//!
//! Caps how many packages' full typechecked state stays resident at once,
//! while everything *cheap* about a package — its `PkgInfo`, interface blob,
//! and index shard — lives outside the cache and survives eviction
//! untouched.

use std::collections::HashMap;
use std::hash::Hash;

/// A simple intrusive doubly-linked order is overkill here — packages
/// number in the hundreds to low thousands, not millions, and eviction is
/// driven by compilation, not a tight per-request hot path. A `Vec` used as
/// a recency stack keeps the implementation honest and easy to audit,
/// matching the original's own choice of a `std::list` over anything
/// fancier.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    recency: Vec<K>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: HashMap::new(), recency: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.touch(key);
            self.entries.get(key)
        } else {
            None
        }
    }

    /// Inserts or replaces `key`'s entry, evicting the least-recently-used
    /// entry if the cache was already at capacity. Returns the evicted key,
    /// if any, so the caller can release whatever heavy state it held.
    pub fn set(&mut self, key: K, value: V) -> Option<K> {
        let evicted = if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_one()
        } else {
            None
        };
        self.entries.insert(key.clone(), value);
        self.touch(&key);
        evicted
    }

    pub fn erase(&mut self, key: &K) -> Option<V> {
        self.recency.retain(|k| k != key);
        self.entries.remove(key)
    }

    fn touch(&mut self, key: &K) {
        self.recency.retain(|k| k != key);
        self.recency.push(key.clone());
    }

    fn evict_one(&mut self) -> Option<K> {
        if self.recency.is_empty() {
            return None;
        }
        let lru_key = self.recency.remove(0);
        self.entries.remove(&lru_key);
        Some(lru_key)
    }
}

impl<K, V> Default for LruCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// An empty placeholder, capacity 1. Callers that size the cache from
    /// data unavailable at construction time (the engine sizes it from the
    /// workspace's package count) replace it once that count is known; see
    /// `WorkspaceEngine`'s lazy re-init while `len() == 0`.
    fn default() -> Self {
        Self::new(1)
    }
}
