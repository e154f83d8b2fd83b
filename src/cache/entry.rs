//! Cache Entry Module
//!
//! Defines the structure for individual memory-provider entries with TTL and
//! access bookkeeping.

use crate::cache::CacheValue;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: CacheValue,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
    /// Estimated footprint of key plus value in bytes
    pub size: usize,
    /// Last read or write (Unix milliseconds)
    pub last_access: u64,
    /// Number of reads since insertion
    pub access_count: u64,
    /// Logical clock value at insertion
    pub inserted_seq: u64,
    /// Logical clock value at last access
    pub access_seq: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `key` - Key the entry is stored under (counted in the size estimate)
    /// * `value` - The value to store
    /// * `expires_at` - Absolute expiry in Unix milliseconds
    /// * `seq` - Logical clock value used for eviction ordering
    pub fn new(key: &str, value: CacheValue, expires_at: Option<u64>, seq: u64) -> Self {
        let now = current_timestamp_ms();
        let size = estimate_size(key, &value);

        Self {
            value,
            created_at: now,
            expires_at,
            size,
            last_access: now,
            access_count: 0,
            inserted_seq: seq,
            access_seq: seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// the expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Same as [`CacheEntry::is_expired`] against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Touch ==
    /// Records a read at logical time `seq`.
    pub fn touch(&mut self, seq: u64) {
        self.access_count += 1;
        self.access_seq = seq;
        self.last_access = current_timestamp_ms();
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Absolute expiry for a TTL in seconds; 0 means no expiry.
pub fn expiry_from_ttl(ttl_seconds: u64) -> Option<u64> {
    if ttl_seconds == 0 {
        None
    } else {
        Some(current_timestamp_ms().saturating_add(ttl_seconds.saturating_mul(1000)))
    }
}

/// Estimated bytes held by an entry: key length plus serialized value length.
pub fn estimate_size(key: &str, value: &CacheValue) -> usize {
    let value_len = serde_json::to_vec(value)
        .map(|encoded| encoded.len())
        .unwrap_or(0);
    key.len() + value_len
}
