//! Memcached cache provider
//!
//! One `async_memcached::Client` per configured server, each behind its own
//! mutex. Keys are spread across servers with FNV-1a; values are stored as
//! JSON text. A server whose connection breaks is reconnected on the next
//! attempt, up to `retries` extra attempts per operation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_memcached::Client;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{
    current_timestamp_ms, CacheStats, CacheValue, DetailedStats, StatsRecorder,
    MAX_MEMCACHED_KEY_LENGTH, MEMCACHED_RELATIVE_TTL_LIMIT,
};
use crate::config::{MemcachedConfig, ProviderType};
use crate::error::{CacheError, CacheResult};
use crate::providers::{CacheProvider, ConnectionTest, ProviderStatus, StatusTracker};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// A single server and its (possibly broken) connection.
struct ServerSlot {
    address: String,
    client: Mutex<Option<Client>>,
}

impl ServerSlot {
    fn new(address: &str, client: Client) -> Self {
        Self {
            address: address.to_string(),
            client: Mutex::new(Some(client)),
        }
    }
}

/// Wire operations; `Increment` is a read-modify-write under one lock hold.
enum Command<'a> {
    Get(&'a str),
    Set {
        key: &'a str,
        payload: &'a [u8],
        ttl: i64,
    },
    Delete(&'a str),
    Increment {
        key: &'a str,
        by: i64,
        ttl: i64,
    },
    Version,
}

impl Command<'_> {
    fn name(&self) -> &'static str {
        match self {
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::Delete(_) => "DELETE",
            Command::Increment { .. } => "INCREMENT",
            Command::Version => "VERSION",
        }
    }
}

enum Reply {
    Value(Option<Vec<u8>>),
    Stored,
    Deleted(bool),
    /// None when the stored value is not an integer or the sum overflows
    Counter(Option<i64>),
    Version(String),
}

/// Memcached-backed provider.
pub struct MemcachedProvider {
    config: MemcachedConfig,
    /// Empty while disconnected
    slots: RwLock<Vec<ServerSlot>>,
    stats: StatsRecorder,
    status: StatusTracker,
}

impl std::fmt::Debug for MemcachedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcachedProvider")
            .field("servers", &self.config.servers)
            .field("timeout", &self.config.timeout)
            .field("retries", &self.config.retries)
            .finish()
    }
}

impl MemcachedProvider {
    pub fn new(config: MemcachedConfig) -> CacheResult<Self> {
        if config.servers.is_empty() {
            return Err(CacheError::ConfigValidation(vec![
                "servers must list at least one address".to_string(),
            ]));
        }

        Ok(Self {
            config,
            slots: RwLock::new(Vec::new()),
            stats: StatsRecorder::new(),
            status: StatusTracker::new(ProviderType::Memcached),
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout)
    }

    fn effective_ttl(&self, ttl: Option<u64>) -> i64 {
        wire_ttl(ttl.unwrap_or(self.config.default_ttl), current_timestamp_ms() / 1000)
    }

    // == Connection Handling ==
    async fn open(&self, address: &str) -> CacheResult<Client> {
        let dsn = dsn_for(address);
        timeout(self.timeout(), Client::new(dsn.as_str()))
            .await
            .map_err(|_| {
                CacheError::Timeout(format!(
                    "connecting to memcached {} took longer than {}ms",
                    address, self.config.timeout
                ))
            })?
            .map_err(|e| {
                CacheError::Connection(format!("Failed to connect to memcached {}: {}", address, e))
            })
    }

    /// Runs `command` against the server owning `route_key`, reconnecting and
    /// retrying on connection-level failures.
    async fn execute(&self, route_key: &str, command: Command<'_>) -> CacheResult<Reply> {
        let slots = self.slots.read().await;
        if slots.is_empty() {
            return Err(CacheError::Connection(
                "Memcached provider is not connected".to_string(),
            ));
        }
        let slot = &slots[server_index(route_key, slots.len())];

        let mut last_error = None;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                debug!(server = %slot.address, attempt = attempt, op = command.name(), "Retrying memcached command");
            }

            let mut guard = slot.client.lock().await;
            if guard.is_none() {
                match self.open(&slot.address).await {
                    Ok(client) => *guard = Some(client),
                    Err(e) => {
                        last_error = Some(e);
                        continue;
                    }
                }
            }
            let Some(client) = guard.as_mut() else {
                continue;
            };

            match timeout(self.timeout(), dispatch(client, &command)).await {
                Ok(Ok(reply)) => {
                    drop(guard);
                    self.status.mark_connected().await;
                    return Ok(reply);
                }
                Ok(Err(async_memcached::Error::Protocol(status))) => {
                    return Err(CacheError::Backend(format!(
                        "Memcached {} failed on {}: {:?}",
                        command.name(),
                        slot.address,
                        status
                    )));
                }
                Ok(Err(e)) => {
                    *guard = None;
                    last_error = Some(CacheError::Connection(format!(
                        "Memcached {} failed on {}: {}",
                        command.name(),
                        slot.address,
                        e
                    )));
                }
                Err(_) => {
                    // The stream may hold a half-read reply
                    *guard = None;
                    last_error = Some(CacheError::Timeout(format!(
                        "Memcached {} on {} exceeded {}ms",
                        command.name(),
                        slot.address,
                        self.config.timeout
                    )));
                }
            }
        }

        self.status.mark_disconnected().await;
        Err(last_error.unwrap_or_else(|| {
            CacheError::Connection(format!("Memcached server {} unavailable", slot.address))
        }))
    }

    /// Counts and records a swallowed failure.
    async fn absorb(&self, op: &'static str, key: &str, error: &CacheError) {
        self.stats.record_error();
        self.status.record_error(error).await;
        warn!(key = %key, op = op, error = %error, "Memcached operation failed");
    }

    async fn fetch(&self, key: &str) -> CacheResult<Option<CacheValue>> {
        validate_key(key)?;
        match self.execute(key, Command::Get(key)).await? {
            Reply::Value(data) => Ok(data.map(decode_value)),
            _ => Err(unexpected_reply("GET")),
        }
    }
}

#[async_trait]
impl CacheProvider for MemcachedProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Memcached
    }

    async fn connect(&self) -> CacheResult<()> {
        let mut slots = self.slots.write().await;
        if !slots.is_empty() {
            return Ok(());
        }

        let mut opened = Vec::with_capacity(self.config.servers.len());
        let mut failures = Vec::new();
        for address in &self.config.servers {
            match self.open(address).await {
                Ok(client) => opened.push(ServerSlot::new(address, client)),
                Err(e) => failures.push(e.to_string()),
            }
        }

        if !failures.is_empty() {
            let error = CacheError::Connection(failures.join("; "));
            self.status.record_error(&error).await;
            self.status.mark_disconnected().await;
            return Err(error);
        }

        *slots = opened;
        self.status.mark_connected().await;
        info!(servers = ?self.config.servers, "Memcached cache provider connected");
        Ok(())
    }

    async fn disconnect(&self) -> CacheResult<()> {
        let released = std::mem::take(&mut *self.slots.write().await);
        self.status.mark_disconnected().await;
        if !released.is_empty() {
            info!("Memcached cache provider disconnected");
        }
        Ok(())
    }

    async fn test_connection(&self) -> ConnectionTest {
        let started = Instant::now();
        let servers = self.slots.read().await.len();
        if servers == 0 {
            return ConnectionTest::failed(started.elapsed(), "Memcached provider is not connected");
        }

        // Route one VERSION to every server
        for index in 0..servers {
            let route_key = route_key_for(index, servers);
            match self.execute(&route_key, Command::Version).await {
                Ok(Reply::Version(version)) => {
                    debug!(server = index, version = %version, "Memcached server answered");
                }
                Ok(_) => {
                    let error = unexpected_reply("VERSION");
                    return ConnectionTest::failed(started.elapsed(), error.to_string());
                }
                Err(e) => return ConnectionTest::failed(started.elapsed(), e.to_string()),
            }
        }
        ConnectionTest::passed(started.elapsed())
    }

    async fn set(&self, key: &str, value: &CacheValue, ttl: Option<u64>) -> bool {
        self.stats.record_set();

        let outcome = match validate_key(key) {
            Ok(()) => match serde_json::to_vec(value) {
                Ok(payload) => {
                    let ttl = self.effective_ttl(ttl);
                    self.execute(
                        key,
                        Command::Set {
                            key,
                            payload: &payload,
                            ttl,
                        },
                    )
                    .await
                }
                Err(e) => Err(CacheError::Serialization(e.to_string())),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => {
                debug!(key = %key, "Cache SET (memcached)");
                true
            }
            Err(e) => {
                self.absorb("SET", key, &e).await;
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.fetch(key).await {
            Ok(Some(value)) => {
                self.stats.record_hit();
                debug!(key = %key, "Cache HIT (memcached)");
                Some(value)
            }
            Ok(None) => {
                self.stats.record_miss();
                debug!(key = %key, "Cache MISS (memcached)");
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
        match self.fetch(key).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                self.absorb("EXISTS", key, &e).await;
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.stats.record_delete();

        let outcome = match validate_key(key) {
            Ok(()) => self.execute(key, Command::Delete(key)).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Reply::Deleted(removed)) => {
                debug!(key = %key, removed = removed, "Cache DEL (memcached)");
                removed
            }
            Ok(_) => {
                self.absorb("DELETE", key, &unexpected_reply("DELETE")).await;
                false
            }
            Err(e) => {
                self.absorb("DELETE", key, &e).await;
                false
            }
        }
    }

    async fn mset(
        &self,
        entries: &HashMap<String, CacheValue>,
        ttl: Option<u64>,
    ) -> HashMap<String, bool> {
        let mut results = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let stored = self.set(key, value, ttl).await;
            results.insert(key.clone(), stored);
        }
        results
    }

    async fn mget(&self, keys: &[String]) -> HashMap<String, CacheValue> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.get(key).await {
                found.insert(key.clone(), value);
            }
        }
        found
    }

    async fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        validate_key(key)?;
        let ttl = self.effective_ttl(None);

        match self.execute(key, Command::Increment { key, by, ttl }).await {
            Ok(Reply::Counter(Some(value))) => Ok(value),
            Ok(Reply::Counter(None)) => Err(CacheError::type_mismatch(
                key,
                "stored value is not an integer or the result overflows",
            )),
            Ok(_) => Err(unexpected_reply("INCREMENT")),
            Err(e) => {
                self.absorb("INCREMENT", key, &e).await;
                Err(e)
            }
        }
    }

    async fn get_stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    async fn get_detailed_stats(&self) -> DetailedStats {
        let mut detailed = DetailedStats::new(ProviderType::Memcached, self.stats.snapshot());
        detailed
            .backend
            .insert("servers".to_string(), self.config.servers.len().to_string());

        // Only servers with a live client are asked; no reconnects here
        let slots = self.slots.read().await;
        for slot in slots.iter() {
            let mut guard = slot.client.lock().await;
            let Some(client) = guard.as_mut() else {
                continue;
            };
            if let Ok(Ok(version)) = timeout(self.timeout(), client.version()).await {
                detailed
                    .backend
                    .insert(format!("server.{}.version", slot.address), version);
            }
        }

        detailed
    }

    async fn get_status(&self) -> ProviderStatus {
        self.status.snapshot().await
    }
}

async fn dispatch(
    client: &mut Client,
    command: &Command<'_>,
) -> Result<Reply, async_memcached::Error> {
    match command {
        Command::Get(key) => {
            let value = client.get(*key).await?;
            Ok(Reply::Value(value.map(|v| v.data)))
        }
        Command::Set { key, payload, ttl } => {
            client.set(*key, *payload, Some(*ttl), None).await?;
            Ok(Reply::Stored)
        }
        Command::Delete(key) => match client.delete(*key).await {
            Ok(()) => Ok(Reply::Deleted(true)),
            // NOT_FOUND
            Err(async_memcached::Error::Protocol(_)) => Ok(Reply::Deleted(false)),
            Err(e) => Err(e),
        },
        Command::Increment { key, by, ttl } => {
            let current = match client.get(*key).await? {
                Some(value) => match parse_counter(&value.data) {
                    Some(current) => current,
                    None => return Ok(Reply::Counter(None)),
                },
                None => 0,
            };
            let Some(next) = current.checked_add(*by) else {
                return Ok(Reply::Counter(None));
            };
            client
                .set(*key, next.to_string().as_bytes(), Some(*ttl), None)
                .await?;
            Ok(Reply::Counter(Some(next)))
        }
        Command::Version => Ok(Reply::Version(client.version().await?)),
    }
}

fn unexpected_reply(op: &str) -> CacheError {
    CacheError::Backend(format!("unexpected memcached reply to {}", op))
}

/// Memcached rejects keys that are empty, too long or contain whitespace or
/// control characters.
fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_MEMCACHED_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key is {} bytes, memcached allows at most {}",
            key.len(),
            MAX_MEMCACHED_KEY_LENGTH
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::InvalidKey(format!(
            "key {:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

/// TTLs beyond 30 days are read by memcached as absolute Unix timestamps.
fn wire_ttl(ttl_seconds: u64, now_seconds: u64) -> i64 {
    let ttl = if ttl_seconds > MEMCACHED_RELATIVE_TTL_LIMIT {
        now_seconds.saturating_add(ttl_seconds)
    } else {
        ttl_seconds
    };
    i64::try_from(ttl).unwrap_or(i64::MAX)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

fn server_index(key: &str, servers: usize) -> usize {
    (fnv1a(key.as_bytes()) % servers as u64) as usize
}

/// Finds a key that routes to `index`, for per-server health checks.
fn route_key_for(index: usize, servers: usize) -> String {
    (0u64..)
        .map(|n| format!("__health:{}", n))
        .find(|candidate| server_index(candidate, servers) == index)
        .unwrap_or_default()
}

fn dsn_for(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("tcp://{}", address)
    }
}

fn parse_counter(data: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(data).ok()?;
    match serde_json::from_str::<CacheValue>(text) {
        Ok(value) => value.as_i64(),
        Err(_) => text.trim().parse().ok(),
    }
}

/// Payloads written by other clients may not be JSON; keep them as strings.
fn decode_value(data: Vec<u8>) -> CacheValue {
    serde_json::from_slice(&data)
        .unwrap_or_else(|_| CacheValue::String(String::from_utf8_lossy(&data).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unreachable_config() -> MemcachedConfig {
        MemcachedConfig {
            servers: vec!["127.0.0.1:1".to_string()],
            timeout: 200,
            retries: 1,
            ..MemcachedConfig::default()
        }
    }

    #[test]
    fn test_requires_servers() {
        let result = MemcachedProvider::new(MemcachedConfig {
            servers: Vec::new(),
            ..MemcachedConfig::default()
        });
        assert!(matches!(result, Err(CacheError::ConfigValidation(_))));
    }

    #[test]
    fn test_counter_writes_use_default_ttl() {
        let provider = MemcachedProvider::new(MemcachedConfig {
            default_ttl: 120,
            ..unreachable_config()
        })
        .unwrap();
        assert_eq!(provider.effective_ttl(None), 120);
        assert_eq!(provider.effective_ttl(Some(5)), 5);
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key("user:42").is_ok());
        assert!(validate_key(&"k".repeat(MAX_MEMCACHED_KEY_LENGTH)).is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key(&"k".repeat(MAX_MEMCACHED_KEY_LENGTH + 1)).is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\there").is_err());
        assert!(validate_key("bell\u{7}").is_err());
    }

    #[test]
    fn test_wire_ttl_switches_to_absolute() {
        let now = 1_700_000_000;
        assert_eq!(wire_ttl(0, now), 0);
        assert_eq!(wire_ttl(60, now), 60);
        assert_eq!(
            wire_ttl(MEMCACHED_RELATIVE_TTL_LIMIT, now),
            MEMCACHED_RELATIVE_TTL_LIMIT as i64
        );
        assert_eq!(
            wire_ttl(MEMCACHED_RELATIVE_TTL_LIMIT + 1, now),
            (now + MEMCACHED_RELATIVE_TTL_LIMIT + 1) as i64
        );
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_server_index_is_stable_and_in_range() {
        for key in ["a", "user:1", "session:abcdef", "x".repeat(200).as_str()] {
            let first = server_index(key, 3);
            assert!(first < 3);
            assert_eq!(first, server_index(key, 3));
            assert_eq!(server_index(key, 1), 0);
        }
    }

    #[test]
    fn test_route_key_for_reaches_every_server() {
        for index in 0..4 {
            let key = route_key_for(index, 4);
            assert_eq!(server_index(&key, 4), index);
        }
    }

    #[test]
    fn test_dsn_for() {
        assert_eq!(dsn_for("localhost:11211"), "tcp://localhost:11211");
        assert_eq!(dsn_for("tcp://cache:11211"), "tcp://cache:11211");
    }

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter(b"41"), Some(41));
        assert_eq!(parse_counter(b"-3"), Some(-3));
        assert_eq!(parse_counter(b"\"text\""), None);
        assert_eq!(parse_counter(b"1.5"), None);
        assert_eq!(parse_counter(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_decode_value() {
        assert_eq!(decode_value(b"[1,2]".to_vec()), json!([1, 2]));
        assert_eq!(decode_value(b"raw bytes".to_vec()), json!("raw bytes"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let provider = MemcachedProvider::new(unreachable_config()).unwrap();

        assert!(provider.connect().await.is_err());
        let status = provider.get_status().await;
        assert!(!status.connected);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_operations_degrade_without_connection() {
        let provider = MemcachedProvider::new(unreachable_config()).unwrap();

        assert!(!provider.set("k", &json!(1), None).await);
        assert_eq!(provider.get("k").await, None);
        assert!(!provider.exists("k").await);
        assert!(!provider.delete("k").await);

        let stats = provider.get_stats().await;
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.deletes, 1);
        assert_eq!(stats.errors, 4);

        assert!(!provider.test_connection().await.success);
    }

    #[tokio::test]
    async fn test_invalid_key_is_a_soft_failure() {
        let provider = MemcachedProvider::new(unreachable_config()).unwrap();

        assert!(!provider.set("bad key", &json!(1), None).await);
        assert!(matches!(
            provider.increment("bad key", 1).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert_eq!(provider.get_stats().await.errors, 1);
    }

    // Integration tests require a running Memcached instance (behind test-services feature)
    #[cfg(feature = "test-services")]
    mod integration {
        use super::*;

        fn live_config() -> MemcachedConfig {
            MemcachedConfig {
                servers: vec![std::env::var("MEMCACHED_ADDRESS")
                    .unwrap_or_else(|_| "127.0.0.1:11211".to_string())],
                ..MemcachedConfig::default()
            }
        }

        #[tokio::test]
        async fn test_memcached_contract() {
            let provider = MemcachedProvider::new(live_config()).unwrap();
            provider.connect().await.unwrap();
            let key = format!("cache-providers-test:{}", std::process::id());

            assert!(provider.set(&key, &json!({"n": 1}), Some(60)).await);
            assert_eq!(provider.get(&key).await, Some(json!({"n": 1})));
            assert!(provider.exists(&key).await);
            assert!(provider.delete(&key).await);
            assert!(!provider.delete(&key).await);

            let counter = format!("{}:counter", key);
            assert_eq!(provider.increment(&counter, 10).await.unwrap(), 10);
            assert_eq!(provider.decrement(&counter, 15).await.unwrap(), -5);
            provider.delete(&counter).await;

            assert!(provider.test_connection().await.success);
            let detailed = provider.get_detailed_stats().await;
            assert!(detailed.backend.keys().any(|k| k.ends_with(".version")));

            provider.disconnect().await.unwrap();
        }
    }
}
