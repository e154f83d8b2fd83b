//! Eviction Index Module
//!
//! Orders memory-provider keys by eviction priority so a victim can be found
//! without scanning every entry.

use std::collections::BTreeMap;

use crate::cache::CacheEntry;
use crate::config::EvictionPolicy;

/// Sort key inside the index; smallest is evicted first.
pub type Rank = (u64, u64);

// == Eviction Index ==
/// Tracks eviction order for one policy.
///
/// Ranks are derived from an entry's logical clock values, which are unique
/// per store, so two live keys never share a rank:
/// - LRU: `(access_seq, 0)`
/// - LFU: `(access_count, access_seq)`
/// - FIFO: `(inserted_seq, 0)`
#[derive(Debug)]
pub struct EvictionIndex {
    policy: EvictionPolicy,
    order: BTreeMap<Rank, String>,
}

impl EvictionIndex {
    // == Constructor ==
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            order: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    // == Rank ==
    /// Computes where an entry sits under this index's policy.
    pub fn rank(&self, entry: &CacheEntry) -> Rank {
        match self.policy {
            EvictionPolicy::Lru => (entry.access_seq, 0),
            EvictionPolicy::Lfu => (entry.access_count, entry.access_seq),
            EvictionPolicy::Fifo => (entry.inserted_seq, 0),
        }
    }

    // == Insert ==
    pub fn insert(&mut self, key: &str, entry: &CacheEntry) {
        self.order.insert(self.rank(entry), key.to_string());
    }

    // == Remove ==
    /// Removes the key tracked at the entry's current rank.
    pub fn remove(&mut self, entry: &CacheEntry) {
        let rank = self.rank(entry);
        self.order.remove(&rank);
    }

    // == Reposition ==
    /// Moves a key after its entry changed; `before` is the rank prior to the change.
    pub fn reposition(&mut self, key: &str, before: Rank, entry: &CacheEntry) {
        let after = self.rank(entry);
        if before != after {
            self.order.remove(&before);
            self.order.insert(after, key.to_string());
        }
    }

    // == Peek Candidate ==
    pub fn peek_candidate(&self) -> Option<&String> {
        self.order.values().next()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}
