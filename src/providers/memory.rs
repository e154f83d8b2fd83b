//! Memory cache provider
//!
//! Single-process provider over [`MemoryStore`]. Every mutation runs under one
//! mutex so the entry-count and byte bounds hold under concurrent writers.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheValue, DetailedStats, MemoryStore};
use crate::config::{MemoryConfig, ProviderType};
use crate::error::CacheResult;
use crate::providers::{CacheProvider, ConnectionTest, ProviderStatus, StatusTracker};

/// In-process provider with LRU/LFU/FIFO eviction.
#[derive(Debug)]
pub struct MemoryProvider {
    config: MemoryConfig,
    store: Mutex<MemoryStore>,
    status: StatusTracker,
}

impl MemoryProvider {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            store: Mutex::new(MemoryStore::from_config(&config)),
            status: StatusTracker::new(ProviderType::Memory),
            config,
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

#[async_trait]
impl CacheProvider for MemoryProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Memory
    }

    async fn connect(&self) -> CacheResult<()> {
        if !self.status.is_connected().await {
            // Counters restart with every connection
            self.store.lock().await.reset_stats();
            self.status.mark_connected().await;
            info!(
                max_size = self.config.max_size,
                policy = ?self.config.eviction_policy,
                "Memory cache provider connected"
            );
        }
        Ok(())
    }

    async fn disconnect(&self) -> CacheResult<()> {
        if self.status.is_connected().await {
            self.store.lock().await.clear();
            self.status.mark_disconnected().await;
            info!("Memory cache provider disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        let started = Instant::now();
        let _guard = self.store.lock().await;
        ConnectionTest::passed(started.elapsed())
    }

    async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> bool {
        let mut store = self.store.lock().await;
        match store.set(key, value.clone(), ttl) {
            Ok(()) => {
                debug!(key = %key, "Cache SET (memory)");
                true
            }
            Err(e) => {
                store.record_error();
                drop(store);
                warn!(key = %key, error = %e, "Memory SET rejected");
                self.status.record_error(&e).await;
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        let value = self.store.lock().await.get(key);
        if value.is_some() {
            debug!(key = %key, "Cache HIT (memory)");
        } else {
            debug!(key = %key, "Cache MISS (memory)");
        }
        value
    }

    async fn exists(&self, key: &str) -> bool {
        self.store.lock().await.exists(key)
    }

    async fn delete(&self, key: &str) -> bool {
        self.store.lock().await.delete(key)
    }

    async fn mset(
        &self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool> {
        let mut store = self.store.lock().await;
        let results = store.mset(entries, ttl);
        for _ in results.values().filter(|stored| !**stored) {
            store.record_error();
        }
        results
    }

    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        self.store.lock().await.mget(keys)
    }

    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.store.lock().await.increment(key, by)
    }

    async fn get_stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }

    async fn get_detailed_stats(&self) -> DetailedStats {
        let store = self.store.lock().await;
        let limits = store.limits();

        let mut detailed = DetailedStats::new(ProviderType::Memory, store.stats());
        detailed.entries = Some(store.live_len() as u64);
        detailed.memory_bytes = Some(store.memory_used() as u64);
        detailed
            .backend
            .insert("maxSize".to_string(), limits.max_entries.to_string());
        if let Some(max_memory) = limits.max_memory {
            detailed
                .backend
                .insert("maxMemory".to_string(), max_memory.to_string());
        }
        detailed
            .backend
            .insert("evictionPolicy".to_string(), format!("{:?}", store.policy()).to_uppercase());
        detailed
    }

    async fn get_status(&self) -> ProviderStatus {
        self.status.snapshot().await
    }
}
