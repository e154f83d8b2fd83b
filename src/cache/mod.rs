//! Cache Module
//!
//! In-process cache engine used by the memory provider: TTL expiration,
//! LRU/LFU/FIFO eviction under entry-count and byte bounds, and statistics.

mod entry;
mod eviction;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use eviction::{EvictionIndex, Rank};
pub use stats::{CacheStats, CombinedStats, DetailedStats, StatsRecorder};
pub use store::{MemoryStore, StoreLimits};

/// Opaque value stored by every provider.
pub type CacheValue = serde_json::Value;

// == Public Constants ==
/// Maximum key length accepted by memcached servers
pub const MAX_MEMCACHED_KEY_LENGTH: usize = 250;

/// TTLs above this many seconds are sent to memcached as absolute Unix timestamps
pub const MEMCACHED_RELATIVE_TTL_LIMIT: u64 = 60 * 60 * 24 * 30;
