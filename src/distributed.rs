//! Distributed Cache Manager
//!
//! Composes providers into one logical cache with ordered failover. Writes go
//! to the first provider that accepts them, reads return the first hit and
//! deletes go everywhere so a fallback copy cannot resurface. There is no
//! replication: after a failover the tiers may disagree until the next write.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheValue, CombinedStats, DetailedStats};
use crate::error::{CacheError, CacheResult};
use crate::factory::ProviderSet;
use crate::providers::{CacheProvider, ConnectionTest, ProviderStatus};

/// Aggregate status with the `distributed` marker.
#[derive(Debug, Clone, Serialize)]
pub struct DistributedStatus {
    pub distributed: bool,
    pub mode: &'static str,
    /// True while at least one provider is connected
    pub connected: bool,
    pub providers: BTreeMap<String, ProviderStatus>,
}

/// Combined counters with the `distributed` marker.
#[derive(Debug, Clone, Serialize)]
pub struct DistributedStats {
    pub distributed: bool,
    #[serde(flatten)]
    pub combined: CombinedStats,
}

// == Distributed Cache Manager ==
#[derive(Debug)]
pub struct DistributedCacheManager {
    providers: ProviderSet,
}

impl DistributedCacheManager {
    /// Wraps `providers`; the first one is the primary.
    pub fn new(providers: ProviderSet) -> CacheResult<Self> {
        if providers.is_empty() {
            return Err(CacheError::ConfigValidation(vec![
                "a distributed cache needs at least one provider".to_string(),
            ]));
        }
        Ok(Self { providers })
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> CacheResult<&Arc<dyn CacheProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| CacheError::ProviderNotFound(name.to_string()))
    }

    // == Lifecycle ==
    /// Connects every provider; succeeds in degraded mode if any one connects.
    pub async fn connect(&self) -> CacheResult<()> {
        let results = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name, provider.connect().await)
        }))
        .await;

        let mut failures = Vec::new();
        for (name, result) in &results {
            if let Err(e) = result {
                warn!(provider = %name, error = %e, "Distributed cache member failed to connect");
                failures.push(format!("{}: {}", name, e));
            }
        }

        if failures.len() == results.len() {
            return Err(CacheError::AllProvidersFailed(failures));
        }
        info!(
            connected = results.len() - failures.len(),
            total = results.len(),
            "Distributed cache connected"
        );
        Ok(())
    }

    pub async fn disconnect(&self) -> CacheResult<()> {
        let results = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name, provider.disconnect().await)
        }))
        .await;

        let failures: Vec<String> = results
            .iter()
            .filter_map(|(name, result)| {
                result.as_ref().err().map(|e| format!("{}: {}", name, e))
            })
            .collect();
        if failures.len() == results.len() {
            return Err(CacheError::AllProvidersFailed(failures));
        }
        info!("Distributed cache disconnected");
        Ok(())
    }

    pub async fn test_connection(&self) -> BTreeMap<String, ConnectionTest> {
        let results = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.test_connection().await)
        }))
        .await;
        results.into_iter().collect()
    }

    // == Data Path ==
    /// Writes to the first provider that accepts the value.
    pub async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> bool {
        for (name, provider) in self.providers.iter() {
            if provider.set(key, value, ttl).await {
                debug!(key = %key, provider = %name, "Distributed SET");
                return true;
            }
            warn!(key = %key, provider = %name, "SET failed, trying next provider");
        }
        warn!(key = %key, "SET failed on every provider");
        false
    }

    /// First hit in provider order.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        for (name, provider) in self.providers.iter() {
            if let Some(value) = provider.get(key).await {
                debug!(key = %key, provider = %name, "Distributed HIT");
                return Some(value);
            }
        }
        None
    }

    pub async fn exists(&self, key: &str) -> bool {
        for (_, provider) in self.providers.iter() {
            if provider.exists(key).await {
                return true;
            }
        }
        false
    }

    /// Deletes from every provider; true if any of them held the key.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = join_all(
            self.providers
                .iter()
                .map(|(_, provider)| provider.delete(key)),
        )
        .await;
        removed.into_iter().any(|removed| removed)
    }

    /// Per-key failover: keys a provider rejects move on to the next one.
    pub async fn mset(
        &self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool> {
        let mut results: HashMap<String, bool> =
            entries.keys().map(|key| (key.clone(), false)).collect();
        let mut pending = entries.clone();

        for (name, provider) in self.providers.iter() {
            if pending.is_empty() {
                break;
            }
            let outcome = provider.mset(&pending, ttl).await;
            for (key, stored) in outcome {
                if stored {
                    pending.remove(&key);
                    results.insert(key, true);
                }
            }
            if !pending.is_empty() {
                warn!(provider = %name, failed = pending.len(), "MSET incomplete, trying next provider");
            }
        }
        results
    }

    /// Per-key fallback: keys missing from one provider are looked up in the next.
    pub async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut remaining: Vec<String> = keys.to_vec();

        for (_, provider) in self.providers.iter() {
            if remaining.is_empty() {
                break;
            }
            let hits = provider.mget(&remaining).await;
            remaining.retain(|key| !hits.contains_key(key));
            found.extend(hits);
        }
        found
    }

    /// Increments on the first provider that does not fail operationally.
    ///
    /// A type mismatch is returned immediately rather than retried elsewhere.
    pub async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        let mut failures = Vec::new();
        for (name, provider) in self.providers.iter() {
            match provider.increment(key, by).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_operational() => {
                    warn!(key = %key, provider = %name, error = %e, "INCREMENT failed, trying next provider");
                    failures.push(format!("{}: {}", name, e));
                }
                Err(e) => return Err(e),
            }
        }
        Err(CacheError::AllProvidersFailed(failures))
    }

    pub async fn decrement(&self, key: &str, by: i64) -> CacheResult<i64> {
        let delta = by
            .checked_neg()
            .ok_or_else(|| CacheError::type_mismatch(key, "decrement would overflow"))?;
        self.increment(key, delta).await
    }

    // == Introspection ==
    pub async fn get_stats(&self) -> DistributedStats {
        let snapshots = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.get_stats().await)
        }))
        .await;
        DistributedStats {
            distributed: true,
            combined: CombinedStats::from_snapshots(snapshots),
        }
    }

    pub async fn get_detailed_stats(&self) -> BTreeMap<String, DetailedStats> {
        let results = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.get_detailed_stats().await)
        }))
        .await;
        results.into_iter().collect()
    }

    pub async fn get_status(&self) -> DistributedStatus {
        let statuses = join_all(self.providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.get_status().await)
        }))
        .await;
        let providers: BTreeMap<String, ProviderStatus> = statuses.into_iter().collect();

        DistributedStatus {
            distributed: true,
            mode: "failover",
            connected: providers.values().any(|status| status.connected),
            providers,
        }
    }
}
