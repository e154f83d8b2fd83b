//! Redis cache provider
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections.
//! Values are stored as JSON text; the configured key prefix is added on the
//! way in and stripped on the way out.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheValue, DetailedStats, StatsRecorder};
use crate::config::{ProviderType, RedisConfig};
use crate::error::{CacheError, CacheResult};
use crate::providers::{CacheProvider, ConnectionTest, ProviderStatus, StatusTracker};

/// Redis-backed provider.
pub struct RedisProvider {
    config: RedisConfig,
    client: redis::Client,
    connection: RwLock<Option<ConnectionManager>>,
    stats: StatsRecorder,
    status: StatusTracker,
}

impl std::fmt::Debug for RedisProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisProvider")
            .field("url", &self.config.display_url())
            .field("key_prefix", &self.config.key_prefix)
            .field("lazy_connect", &self.config.lazy_connect)
            .finish()
    }
}

impl RedisProvider {
    /// Builds a disconnected provider. No network traffic happens here.
    pub fn new(config: RedisConfig) -> CacheResult<Self> {
        let client = redis::Client::open(connection_info(&config)).map_err(|e| {
            CacheError::ConfigValidation(vec![format!("invalid Redis connection settings: {}", e)])
        })?;

        Ok(Self {
            config,
            client,
            connection: RwLock::new(None),
            stats: StatsRecorder::new(),
            status: StatusTracker::new(ProviderType::Redis),
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    fn effective_ttl(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.config.default_ttl)
    }

    // == Connection Handling ==
    async fn establish(&self) -> CacheResult<ConnectionManager> {
        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = timeout(self.timeout(), ConnectionManager::new(self.client.clone()))
            .await
            .map_err(|_| {
                CacheError::Timeout(format!(
                    "connecting to Redis took longer than {}ms",
                    self.config.timeout
                ))
            })?
            .map_err(|e| CacheError::Connection(format!("Failed to connect to Redis: {}", e)))?;

        *guard = Some(conn.clone());
        self.status.mark_connected().await;
        info!(url = %self.config.display_url(), "Redis cache provider connected");
        Ok(conn)
    }

    async fn connection(&self) -> CacheResult<ConnectionManager> {
        if let Some(conn) = self.connection.read().await.as_ref() {
            return Ok(conn.clone());
        }
        if self.config.lazy_connect {
            return self.establish().await;
        }
        Err(CacheError::Connection("Redis provider is not connected".to_string()))
    }

    /// Runs one command against the shared connection, bounded by the timeout.
    async fn run<T, F, Fut>(&self, op: &'static str, command: F) -> CacheResult<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match timeout(self.timeout(), command(conn)).await {
            Ok(Ok(value)) => {
                self.status.mark_connected().await;
                Ok(value)
            }
            Ok(Err(e)) => {
                if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
                    self.status.mark_disconnected().await;
                }
                Err(classify(op, e))
            }
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis {} exceeded {}ms",
                op, self.config.timeout
            ))),
        }
    }

    /// Counts and records a swallowed failure.
    async fn absorb(&self, op: &'static str, key: &str, error: &CacheError) {
        self.stats.record_error();
        self.status.record_error(error).await;
        warn!(key = %key, op = op, error = %error, "Redis operation failed");
    }
}

#[async_trait]
impl CacheProvider for RedisProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Redis
    }

    async fn connect(&self) -> CacheResult<()> {
        if self.config.lazy_connect {
            debug!("Redis lazy connect: deferring connection to first command");
            return Ok(());
        }
        match self.establish().await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.status.record_error(&e).await;
                self.status.mark_disconnected().await;
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> CacheResult<()> {
        let previous = self.connection.write().await.take();
        self.status.mark_disconnected().await;
        if previous.is_some() {
            info!("Redis cache provider disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        let started = Instant::now();
        let result: CacheResult<String> = self
            .run("PING", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await;

        match result {
            Ok(pong) if pong == "PONG" => ConnectionTest::passed(started.elapsed()),
            Ok(other) => ConnectionTest::failed(
                started.elapsed(),
                format!("unexpected PING reply: {}", other),
            ),
            Err(e) => ConnectionTest::failed(started.elapsed(), e.to_string()),
        }
    }

    async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> bool {
        self.stats.record_set();

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                let error = CacheError::Serialization(e.to_string());
                self.absorb("SET", key, &error).await;
                return false;
            }
        };
        let full_key = self.prefixed(key);
        let ttl_seconds = self.effective_ttl(ttl);

        let result = self
            .run("SET", |mut conn| async move {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&full_key).arg(&payload);
                if ttl_seconds > 0 {
                    cmd.arg("EX").arg(ttl_seconds);
                }
                cmd.query_async::<()>(&mut conn).await
            })
            .await;

        match result {
            Ok(()) => {
                debug!(key = %key, ttl_seconds = ttl_seconds, "Cache SET (redis)");
                true
            }
            Err(e) => {
                self.absorb("SET", key, &e).await;
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        let full_key = self.prefixed(key);
        let result: CacheResult<Option<String>> = self
            .run("GET", |mut conn| async move {
                redis::cmd("GET").arg(&full_key).query_async(&mut conn).await
            })
            .await;

        match result {
            Ok(Some(raw)) => {
                self.stats.record_hit();
                debug!(key = %key, "Cache HIT (redis)");
                Some(decode_value(raw))
            }
            Ok(None) => {
                self.stats.record_miss();
                debug!(key = %key, "Cache MISS (redis)");
                None
            }
            Err(e) => {
                self.stats.record_miss();
                self.absorb("GET", key, &e).await;
                None
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let full_key = self.prefixed(key);
        let result: CacheResult<i64> = self
            .run("EXISTS", |mut conn| async move {
                redis::cmd("EXISTS").arg(&full_key).query_async(&mut conn).await
            })
            .await;

        match result {
            Ok(count) => count > 0,
            Err(e) => {
                self.absorb("EXISTS", key, &e).await;
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.stats.record_delete();
        let full_key = self.prefixed(key);
        let result: CacheResult<i64> = self
            .run("DEL", |mut conn| async move {
                redis::cmd("DEL").arg(&full_key).query_async(&mut conn).await
            })
            .await;

        match result {
            Ok(removed) => {
                debug!(key = %key, removed = removed, "Cache DEL (redis)");
                removed > 0
            }
            Err(e) => {
                self.absorb("DEL", key, &e).await;
                false
            }
        }
    }

    async fn mset(
        &self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool> {
        let ttl_seconds = self.effective_ttl(ttl);
        let mut results = HashMap::with_capacity(entries.len());
        let mut pipe = redis::pipe();
        let mut queued = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            self.stats.record_set();
            match serde_json::to_string(value) {
                Ok(payload) => {
                    let cmd = pipe.cmd("SET").arg(self.prefixed(key)).arg(payload);
                    if ttl_seconds > 0 {
                        cmd.arg("EX").arg(ttl_seconds);
                    }
                    cmd.ignore();
                    queued.push(key.clone());
                }
                Err(e) => {
                    let error = CacheError::Serialization(e.to_string());
                    self.absorb("MSET", key, &error).await;
                    results.insert(key.clone(), false);
                }
            }
        }

        if queued.is_empty() {
            return results;
        }

        let outcome = self
            .run("MSET", |mut conn| async move {
                pipe.query_async::<()>(&mut conn).await
            })
            .await;

        let stored = match outcome {
            Ok(()) => true,
            Err(e) => {
                self.absorb("MSET", &queued.join(","), &e).await;
                false
            }
        };
        results.extend(queued.into_iter().map(|key| (key, stored)));
        results
    }

    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        if keys.is_empty() {
            return HashMap::new();
        }

        let full_keys: Vec<String> = keys.iter().map(|key| self.prefixed(key)).collect();
        let result: CacheResult<Vec<Option<String>>> = self
            .run("MGET", |mut conn| async move {
                redis::cmd("MGET").arg(&full_keys).query_async(&mut conn).await
            })
            .await;

        match result {
            Ok(values) => keys
                .iter()
                .zip(values)
                .filter_map(|(key, raw)| {
                    match raw {
                        Some(raw) => {
                            self.stats.record_hit();
                            Some((key.clone(), decode_value(raw)))
                        }
                        None => {
                            self.stats.record_miss();
                            None
                        }
                    }
                })
                .collect(),
            Err(e) => {
                for _ in keys {
                    self.stats.record_miss();
                }
                self.absorb("MGET", &keys.join(","), &e).await;
                HashMap::new()
            }
        }
    }

    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        let full_key = self.prefixed(key);
        let target = full_key.as_str();
        let result: CacheResult<i64> = self
            .run("INCRBY", |mut conn| async move {
                redis::cmd("INCRBY")
                    .arg(target)
                    .arg(by)
                    .query_async(&mut conn)
                    .await
            })
            .await;

        let value = match result {
            Ok(value) => value,
            Err(CacheError::Backend(message)) if is_type_mismatch(&message) => {
                return Err(CacheError::type_mismatch(key, message));
            }
            Err(e) => {
                self.absorb("INCRBY", key, &e).await;
                return Err(e);
            }
        };

        // The counter already moved; a failed refresh only costs the expiry
        let ttl = self.config.default_ttl;
        let op = if ttl > 0 { "EXPIRE" } else { "PERSIST" };
        let refreshed: CacheResult<()> = self
            .run(op, |mut conn| async move {
                if ttl > 0 {
                    redis::cmd("EXPIRE")
                        .arg(target)
                        .arg(ttl)
                        .query_async(&mut conn)
                        .await
                } else {
                    redis::cmd("PERSIST").arg(target).query_async(&mut conn).await
                }
            })
            .await;
        if let Err(e) = refreshed {
            self.absorb(op, key, &e).await;
        }
        Ok(value)
    }

    async fn get_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    async fn get_detailed_stats(&self) -> DetailedStats {
        let mut detailed = DetailedStats::new(ProviderType::Redis, self.stats.snapshot());
        detailed
            .backend
            .insert("keyPrefix".to_string(), self.config.key_prefix.clone());
        detailed
            .backend
            .insert("db".to_string(), self.config.db.to_string());

        // Server detail only when a connection already exists
        let conn = self.connection.read().await.clone();
        let Some(conn) = conn else {
            return detailed;
        };

        let mut dbsize_conn = conn.clone();
        if let Ok(Ok(size)) = timeout(
            self.timeout(),
            redis::cmd("DBSIZE").query_async::<u64>(&mut dbsize_conn),
        )
        .await
        {
            detailed.entries = Some(size);
        }

        let mut info_conn = conn;
        if let Ok(Ok(info)) = timeout(
            self.timeout(),
            redis::cmd("INFO").arg("stats").query_async::<String>(&mut info_conn),
        )
        .await
        {
            detailed.backend.extend(parse_info_stats(&info));
        }

        detailed
    }

    async fn get_status(&self) -> ProviderStatus {
        self.status.snapshot().await
    }
}

/// Maps a client error onto the cache error classes.
fn classify(op: &str, error: redis::RedisError) -> CacheError {
    if error.is_timeout() {
        CacheError::Timeout(format!("Redis {} timed out: {}", op, error))
    } else if error.is_connection_dropped() || error.is_connection_refusal() || error.is_io_error()
    {
        CacheError::Connection(format!("Redis {} failed: {}", op, error))
    } else {
        CacheError::Backend(format!("Redis {} failed: {}", op, error))
    }
}

/// Replies to `INCRBY` that mean the stored value cannot be counted.
fn is_type_mismatch(message: &str) -> bool {
    message.contains("not an integer")
        || message.contains("WRONGTYPE")
        || message.contains("would overflow")
}

/// Payloads written by other clients may not be JSON; keep them as strings.
fn decode_value(raw: String) -> CacheValue {
    serde_json::from_str(&raw).unwrap_or(CacheValue::String(raw))
}

/// Picks the server-side counters worth surfacing from `INFO stats`.
fn parse_info_stats(info: &str) -> BTreeMap<String, String> {
    const FIELDS: [&str; 4] = [
        "keyspace_hits",
        "keyspace_misses",
        "evicted_keys",
        "expired_keys",
    ];

    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .filter(|(field, _)| FIELDS.contains(field))
        .map(|(field, value)| (format!("server.{}", field), value.to_string()))
        .collect()
}

/// Client settings built field by field, so passwords need no URL escaping.
fn connection_info(config: &RedisConfig) -> redis::ConnectionInfo {
    redis::ConnectionInfo {
        addr: redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: redis::RedisConnectionInfo {
            db: i64::from(config.db),
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Nothing listens on port 1, so every command fails fast.
    fn unreachable_config(lazy_connect: bool) -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            key_prefix: "test:".to_string(),
            lazy_connect,
            timeout: 200,
            ..RedisConfig::default()
        }
    }

    #[test]
    fn test_password_with_url_delimiters() {
        let config = RedisConfig {
            host: "cache.internal".to_string(),
            password: Some("p@ss/w#rd".to_string()),
            ..RedisConfig::default()
        };

        let info = connection_info(&config);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w#rd"));
        assert_eq!(info.redis.db, 0);

        let provider = RedisProvider::new(config).unwrap();
        let debug = format!("{:?}", provider);
        assert!(debug.contains("redis://:***@cache.internal:6379/0"));
        assert!(!debug.contains("ss/w"));
    }

    #[test]
    fn test_decode_value_falls_back_to_string() {
        assert_eq!(decode_value("42".to_string()), json!(42));
        assert_eq!(decode_value(r#"{"a":1}"#.to_string()), json!({"a": 1}));
        assert_eq!(decode_value("plain text".to_string()), json!("plain text"));
    }

    #[test]
    fn test_type_mismatch_detection() {
        assert!(is_type_mismatch(
            "Redis INCRBY failed: ERR value is not an integer or out of range"
        ));
        assert!(is_type_mismatch(
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        ));
        assert!(is_type_mismatch(
            "Redis INCRBY failed: ResponseError: increment or decrement would overflow"
        ));
        assert!(!is_type_mismatch("connection reset"));
    }

    #[test]
    fn test_parse_info_stats() {
        let info = "# Stats\r\ntotal_connections_received:4\r\nkeyspace_hits:10\r\nkeyspace_misses:3\r\nevicted_keys:0\r\n";
        let parsed = parse_info_stats(info);

        assert_eq!(parsed.get("server.keyspace_hits").map(String::as_str), Some("10"));
        assert_eq!(parsed.get("server.keyspace_misses").map(String::as_str), Some("3"));
        assert!(!parsed.contains_key("server.total_connections_received"));
    }

    #[test]
    fn test_prefix_is_applied() {
        let provider = RedisProvider::new(unreachable_config(false)).unwrap();
        assert_eq!(provider.prefixed("user:1"), "test:user:1");
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let provider = RedisProvider::new(unreachable_config(false)).unwrap();

        assert!(provider.connect().await.is_err());
        let status = provider.get_status().await;
        assert!(!status.connected);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_operations_degrade_without_connection() {
        let provider = RedisProvider::new(unreachable_config(false)).unwrap();

        assert!(!provider.set("k", &json!("v"), Some(10)).await);
        assert_eq!(provider.get("k").await, None);
        assert!(!provider.exists("k").await);
        assert!(!provider.delete("k").await);
        assert!(provider.mget(&["k".to_string()]).await.is_empty());

        let stats = provider.get_stats().await;
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.errors, 5);
        assert_eq!(stats.hits, 0);

        let increment = provider.increment("counter", 1).await;
        assert!(matches!(increment, Err(ref e) if e.is_operational()));
    }

    #[tokio::test]
    async fn test_lazy_connect_defers_until_first_command() {
        let provider = RedisProvider::new(unreachable_config(true)).unwrap();

        assert!(provider.connect().await.is_ok());
        assert!(!provider.get_status().await.connected);

        assert!(!provider.set("k", &json!(1), None).await);
        let test = provider.test_connection().await;
        assert!(!test.success);
        assert!(test.error.is_some());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let provider = RedisProvider::new(unreachable_config(false)).unwrap();
        assert!(provider.disconnect().await.is_ok());
        assert!(provider.disconnect().await.is_ok());
    }

    // Integration tests require a running Redis instance (behind test-services feature)
    #[cfg(feature = "test-services")]
    mod integration {
        use super::*;

        fn live_config() -> RedisConfig {
            RedisConfig {
                host: std::env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                key_prefix: format!("cache-providers-test:{}:", std::process::id()),
                ..RedisConfig::default()
            }
        }

        #[tokio::test]
        async fn test_redis_contract() {
            let provider = RedisProvider::new(live_config()).unwrap();
            provider.connect().await.unwrap();

            assert!(provider.set("doc", &json!({"id": 7}), Some(60)).await);
            assert_eq!(provider.get("doc").await, Some(json!({"id": 7})));
            assert!(provider.exists("doc").await);

            let found = provider
                .mget(&["doc".to_string(), "missing".to_string()])
                .await;
            assert_eq!(found.len(), 1);

            assert_eq!(provider.increment("hits", 5).await.unwrap(), 5);
            assert_eq!(provider.decrement("hits", 3).await.unwrap(), 2);
            assert!(matches!(
                provider.increment("doc", 1).await,
                Err(CacheError::TypeMismatch { .. })
            ));

            // Overflow is the caller's problem, not a backend failure
            assert!(provider.set("max", &json!(i64::MAX), None).await);
            let errors_before = provider.get_stats().await.errors;
            assert!(matches!(
                provider.increment("max", 1).await,
                Err(CacheError::TypeMismatch { .. })
            ));
            assert_eq!(provider.get_stats().await.errors, errors_before);
            assert!(provider.delete("max").await);

            assert!(provider.delete("doc").await);
            assert!(provider.delete("hits").await);
            assert!(!provider.exists("doc").await);
            assert!(provider.test_connection().await.success);

            provider.disconnect().await.unwrap();
        }

        #[tokio::test]
        async fn test_redis_counter_expiry_restarts() {
            let provider = RedisProvider::new(RedisConfig {
                default_ttl: 120,
                ..live_config()
            })
            .unwrap();
            provider.connect().await.unwrap();

            assert!(provider.set("visits", &json!(1), Some(5)).await);
            assert_eq!(provider.increment("visits", 1).await.unwrap(), 2);

            let mut conn = provider.connection().await.unwrap();
            let ttl: i64 = redis::cmd("TTL")
                .arg(provider.prefixed("visits"))
                .query_async(&mut conn)
                .await
                .unwrap();
            assert!(ttl > 5 && ttl <= 120, "ttl was {}", ttl);

            provider.delete("visits").await;
        }

        #[tokio::test]
        async fn test_redis_ttl_expiry() {
            let provider = RedisProvider::new(live_config()).unwrap();
            provider.connect().await.unwrap();

            assert!(provider.set("short", &json!("temporary"), Some(1)).await);
            assert!(provider.exists("short").await);

            tokio::time::sleep(Duration::from_millis(1500)).await;

            assert!(!provider.exists("short").await);
            assert_eq!(provider.get("short").await, None);
        }
    }
}
