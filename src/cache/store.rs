//! Memory Store Module
//!
//! Bounded in-process cache engine: HashMap storage with a policy-ordered
//! eviction index, an expiry index and lazy TTL purging. Callers serialize
//! access (the memory provider keeps it behind one mutex).

use std::collections::{BTreeSet, HashMap};

use serde_json::json;

use crate::cache::entry::{current_timestamp_ms, expiry_from_ttl};
use crate::cache::{CacheEntry, CacheStats, CacheValue, EvictionIndex};
use crate::config::{EvictionPolicy, MemoryConfig};
use crate::error::{CacheError, CacheResult};

// == Store Limits ==
/// Capacity bounds and TTL defaults for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    /// Maximum number of entries (at least 1)
    pub max_entries: usize,
    /// Optional budget over estimated entry sizes, in bytes
    pub max_memory: Option<usize>,
    /// Seconds applied when a write carries no TTL; 0 = no expiry
    pub default_ttl: u64,
}

// == Memory Store ==
#[derive(Debug)]
pub struct MemoryStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Policy-ordered eviction candidates
    eviction: EvictionIndex,
    /// Entries with a TTL, soonest expiry first
    expiry: BTreeSet<(u64, String)>,
    /// Performance statistics
    stats: CacheStats,
    limits: StoreLimits,
    /// Sum of estimated entry sizes
    memory_used: usize,
    /// Logical clock for insertion/access ordering
    clock: u64,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a new MemoryStore with the given bounds and eviction policy.
    pub fn new(limits: StoreLimits, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            eviction: EvictionIndex::new(policy),
            expiry: BTreeSet::new(),
            stats: CacheStats::new(),
            limits: StoreLimits {
                max_entries: limits.max_entries.max(1),
                ..limits
            },
            memory_used: 0,
            clock: 0,
        }
    }

    pub fn from_config(config: &MemoryConfig) -> Self {
        Self::new(
            StoreLimits {
                max_entries: config.max_size,
                max_memory: config.max_memory,
                default_ttl: config.default_ttl,
            },
            config.eviction_policy,
        )
    }

    // == Set ==
    /// Stores a key-value pair with optional TTL.
    ///
    /// If the key already exists, the value is overwritten and TTL is reset.
    /// If a bound would be exceeded, expired entries are evicted first, then
    /// entries in policy order, before the new entry is admitted.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL in seconds (uses the default TTL if None)
    pub fn set(&mut self, key: &str, value: CacheValue, ttl: Option<u64>) -> CacheResult<()> {
        self.stats.record_set();
        if key.is_empty() {
            return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
        }

        let expires_at = expiry_from_ttl(ttl.unwrap_or(self.limits.default_ttl));
        self.admit(key, value, expires_at)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<CacheValue> {
        let now = current_timestamp_ms();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            return None;
        }

        let seq = self.next_seq();
        let entry = self.entries.get_mut(key)?;
        let before = self.eviction.rank(entry);
        entry.touch(seq);
        self.eviction.reposition(key, before, entry);

        self.stats.record_hit();
        Some(entry.value.clone())
    }

    // == Exists ==
    /// Checks for a live entry without touching access order or statistics.
    pub fn exists(&mut self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.remove_entry(key);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    // == Delete ==
    /// Removes an entry by key.
    ///
    /// Returns true only if a live entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.stats.record_delete();
        match self.remove_entry(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    // == Bulk Operations ==
    /// Retrieves several keys; missing or expired keys are absent from the result.
    pub fn mget(&mut self, keys: &[String]) -> HashMap<String, CacheValue> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|value| (key.clone(), value)))
            .collect()
    }

    /// Stores several entries; the result records per-key success.
    pub fn mset(
        &mut self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool> {
        entries
            .iter()
            .map(|(key, value)| {
                let stored = self.set(key, value.clone(), ttl).is_ok();
                (key.clone(), stored)
            })
            .collect()
    }

    // == Increment ==
    /// Adds `by` to an integer entry, starting from 0 when the key is absent.
    ///
    /// The counter's expiry restarts from the default TTL on every call.
    pub fn increment(&mut self, key: &str, by: i64) -> CacheResult<i64> {
        let now = current_timestamp_ms();
        let base = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => entry
                .value
                .as_i64()
                .ok_or_else(|| CacheError::type_mismatch(key, "value is not an integer"))?,
            _ => 0,
        };

        let next = base
            .checked_add(by)
            .ok_or_else(|| CacheError::type_mismatch(key, "increment would overflow"))?;
        self.admit(key, json!(next), expiry_from_ttl(self.limits.default_ttl))?;
        Ok(next)
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Counts a failure the caller absorbed.
    pub fn record_error(&mut self) {
        self.stats.record_error();
    }

    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::new();
    }

    // == Clear ==
    /// Drops every entry; statistics are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.eviction.clear();
        self.expiry.clear();
        self.memory_used = 0;
    }

    // == Length ==
    /// Returns the number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that have not expired.
    pub fn live_len(&self) -> usize {
        let now = current_timestamp_ms();
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    /// Sum of estimated entry sizes in bytes.
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.eviction.policy()
    }

    // == Internals ==
    fn next_seq(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Makes room for and inserts an entry, replacing any previous value.
    fn admit(&mut self, key: &str, value: CacheValue, expires_at: Option<u64>) -> CacheResult<()> {
        let seq = self.next_seq();
        let mut entry = CacheEntry::new(key, value, expires_at, seq);

        if let Some(max_memory) = self.limits.max_memory {
            if entry.size > max_memory {
                return Err(CacheError::Backend(format!(
                    "entry of {} bytes exceeds the memory budget of {} bytes",
                    entry.size, max_memory
                )));
            }
        }

        // Overwrites keep their read count so LFU does not punish hot keys
        if let Some(previous) = self.remove_entry(key) {
            entry.access_count = previous.access_count;
        }

        self.make_room(entry.size);

        self.eviction.insert(key, &entry);
        if let Some(expires) = entry.expires_at {
            self.expiry.insert((expires, key.to_string()));
        }
        self.memory_used += entry.size;
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    /// Evicts until one more entry of `incoming` bytes fits both bounds.
    fn make_room(&mut self, incoming: usize) {
        loop {
            let over_count = self.entries.len() >= self.limits.max_entries;
            let over_memory = self
                .limits
                .max_memory
                .is_some_and(|max| self.memory_used + incoming > max);
            if !over_count && !over_memory {
                break;
            }

            match self.next_victim() {
                Some(victim) => {
                    self.remove_entry(&victim);
                    self.stats.record_eviction();
                }
                None => break,
            }
        }
    }

    /// Expired entries go before anything the policy would pick.
    fn next_victim(&self) -> Option<String> {
        let now = current_timestamp_ms();
        if let Some((expires, key)) = self.expiry.first() {
            if *expires <= now {
                return Some(key.clone());
            }
        }
        self.eviction.peek_candidate().cloned()
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.eviction.remove(&entry);
        if let Some(expires) = entry.expires_at {
            self.expiry.remove(&(expires, key.to_string()));
        }
        self.memory_used -= entry.size;
        Some(entry)
    }
}
