//! Cache Providers
//!
//! The unified cache contract and its three backends.
//!
//! ```text
//! CacheProvider (trait, Arc<dyn CacheProvider>)
//!   ├── MemoryProvider     <- bounded in-process store, synchronous eviction
//!   ├── RedisProvider      <- ConnectionManager, key prefixing, lazy connect
//!   └── MemcachedProvider  <- per-server clients, key hashing, retries
//! ```
//!
//! Data-path operations (`get`, `set`, `exists`, `delete`, `mget`, `mset`)
//! never return errors: backend failures become `None`/`false`/empty maps, bump
//! the `errors` counter and are kept as `last_error` on the status. Only the
//! lifecycle and counter operations return `CacheResult`.

mod memcached;
mod memory;
mod redis;
mod status;

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::cache::{CacheStats, CacheValue, DetailedStats};
use crate::config::ProviderType;
use crate::error::CacheResult;

pub use memcached::MemcachedProvider;
pub use memory::MemoryProvider;
pub use self::redis::RedisProvider;
pub use status::{ConnectionTest, ProviderStatus, StatusTracker};

// == Cache Provider ==
/// Operations every backend implements.
#[async_trait]
pub trait CacheProvider: Send + Sync + Debug {
    /// Backend this provider talks to.
    fn provider_type(&self) -> ProviderType;

    /// Establishes the backend connection.
    ///
    /// Fails with a connection or timeout error if the backend cannot be
    /// reached within the configured timeout. Never fails for memory.
    async fn connect(&self) -> CacheResult<()>;

    /// Releases the connection. Calling it twice is fine.
    async fn disconnect(&self) -> CacheResult<()>;

    /// Lightweight round trip for health checks; never errors.
    async fn test_connection(&self) -> ConnectionTest;

    /// Stores `value` under `key`.
    ///
    /// Without `ttl` the provider's default TTL applies (0 = no expiry).
    /// Returns false on a recoverable backend failure.
    async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> bool;

    /// Returns the value for `key`, or None when missing, expired or unreachable.
    async fn get(&self, key: &str) -> Option<CacheValue>;

    /// Agrees with `get` about expiry.
    async fn exists(&self, key: &str) -> bool;

    /// True iff a key was actually removed.
    async fn delete(&self, key: &str) -> bool;

    /// Bulk write; the map holds per-key success. Not atomic across keys.
    async fn mset(
        &self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool>;

    /// Bulk read; keys that were not found are absent from the map.
    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue>;

    /// Adds `by` to an integer value, treating a missing key as 0.
    ///
    /// Each call restarts the counter's expiry from the default TTL.
    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64>;

    /// Subtracts `by` from an integer value, treating a missing key as 0.
    async fn decrement(&self, key: &str, by: i64) -> CacheResult<i64> {
        let delta = by.checked_neg().ok_or_else(|| {
            crate::error::CacheError::type_mismatch(key, "decrement would overflow")
        })?;
        self.increment(key, delta).await
    }

    /// Counter snapshot.
    async fn get_stats(&self) -> CacheStats;

    /// Counter snapshot plus backend detail.
    async fn get_detailed_stats(&self) -> DetailedStats;

    /// Connection state; no side effects.
    async fn get_status(&self) -> ProviderStatus;
}
