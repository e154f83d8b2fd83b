//! Cache Statistics Module
//!
//! Tracks cache performance metrics: hits, misses, sets, deletes, evictions
//! and swallowed errors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::ProviderType;

// == Cache Stats ==
/// Point-in-time counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that returned a value
    pub hits: u64,
    /// Number of reads that found nothing (missing, expired or failed)
    pub misses: u64,
    /// Number of write attempts
    pub sets: u64,
    /// Number of delete attempts
    pub deletes: u64,
    /// Number of entries removed to honor a capacity bound
    pub evictions: u64,
    /// Number of operational failures absorbed by the provider
    pub errors: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    // == Accumulate ==
    /// Adds another snapshot's counters into this one.
    pub fn accumulate(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.sets += other.sets;
        self.deletes += other.deletes;
        self.evictions += other.evictions;
        self.errors += other.errors;
    }
}

// == Stats Recorder ==
/// Lock-free counters for providers that have no store lock of their own.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    errors: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

// == Detailed Stats ==
/// Counters plus backend-specific detail.
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStats {
    pub provider: ProviderType,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
    /// Live entries, when the backend can report them cheaply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    /// Estimated bytes held, memory provider only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Free-form backend facts (server counters, versions, bounds)
    pub backend: BTreeMap<String, String>,
}

impl DetailedStats {
    pub fn new(provider: ProviderType, stats: CacheStats) -> Self {
        Self {
            provider,
            hit_rate: stats.hit_rate(),
            stats,
            entries: None,
            memory_bytes: None,
            backend: BTreeMap::new(),
        }
    }
}

// == Combined Stats ==
/// Per-provider counters keyed by provider name, plus their sum.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CombinedStats {
    pub providers: BTreeMap<String, CacheStats>,
    pub total: CacheStats,
}

impl CombinedStats {
    pub fn from_snapshots<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = (String, CacheStats)>,
    {
        let mut combined = CombinedStats::default();
        for (name, stats) in snapshots {
            combined.total.accumulate(&stats);
            combined.providers.insert(name, stats);
        }
        combined
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.sets, 0);
        assert_eq!(stats.deletes, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.hit_rate(), 0.75);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::new();
        recorder.record_hit();
        recorder.record_miss();
        recorder.record_miss();
        recorder.record_set();
        recorder.record_delete();
        recorder.record_error();

        let stats = recorder.snapshot();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn test_combined_stats_total() {
        let a = CacheStats {
            hits: 3,
            misses: 1,
            sets: 4,
            ..CacheStats::default()
        };
        let b = CacheStats {
            hits: 2,
            errors: 5,
            evictions: 1,
            ..CacheStats::default()
        };

        let combined = CombinedStats::from_snapshots(vec![("a".to_string(), a), ("b".to_string(), b)]);
        assert_eq!(combined.providers.len(), 2);
        assert_eq!(combined.total.hits, 5);
        assert_eq!(combined.total.misses, 1);
        assert_eq!(combined.total.sets, 4);
        assert_eq!(combined.total.errors, 5);
        assert_eq!(combined.total.evictions, 1);
    }

    #[test]
    fn test_detailed_stats_serializes_flat_counters() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        let detailed = DetailedStats::new(ProviderType::Memory, stats);
        let json = serde_json::to_value(&detailed).unwrap();

        assert_eq!(json["provider"], "MEMORY");
        assert_eq!(json["hits"], 1);
        assert_eq!(json["hit_rate"], 1.0);
        assert!(json.get("entries").is_none());
    }
}
