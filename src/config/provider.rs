//! Provider Configuration Types
//!
//! Typed, serde-backed configuration for each supported backend. The JSON
//! form is a tagged object keyed by `type`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Provider Type ==
/// The closed set of backends a provider can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderType {
    Memory,
    Redis,
    Memcached,
}

impl ProviderType {
    /// Every supported type, in registry order.
    pub const ALL: [ProviderType; 3] = [
        ProviderType::Memory,
        ProviderType::Redis,
        ProviderType::Memcached,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Memory => "MEMORY",
            ProviderType::Redis => "REDIS",
            ProviderType::Memcached => "MEMCACHED",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MEMORY" => Ok(ProviderType::Memory),
            "REDIS" => Ok(ProviderType::Redis),
            "MEMCACHED" => Ok(ProviderType::Memcached),
            _ => Err(CacheError::UnsupportedType(s.to_string())),
        }
    }
}

// == Eviction Policy ==
/// Victim selection rule for the memory provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvictionPolicy {
    /// Oldest last access goes first
    #[default]
    Lru,
    /// Lowest access count goes first, ties broken by oldest last access
    Lfu,
    /// Oldest insertion goes first
    Fifo,
}

impl EvictionPolicy {
    pub const NAMES: [&'static str; 3] = ["LRU", "LFU", "FIFO"];
}

// == Memory Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Maximum number of entries
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Optional byte budget over the estimated entry sizes
    #[serde(default)]
    pub max_memory: Option<usize>,
    /// Seconds; 0 disables expiry for writes without an explicit TTL
    #[serde(default = "default_memory_ttl", rename = "defaultTTL")]
    pub default_ttl: u64,
    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_size: default_max_size(),
            max_memory: None,
            default_ttl: default_memory_ttl(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

// == Redis Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedisConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Prepended to every key sent to the server
    #[serde(default)]
    pub key_prefix: String,
    /// Defer connecting until the first command
    #[serde(default)]
    pub lazy_connect: bool,
    #[serde(default, rename = "defaultTTL")]
    pub default_ttl: u64,
    /// Milliseconds; bounds connecting and every command
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            name: None,
            host: "localhost".to_string(),
            port: default_redis_port(),
            db: 0,
            password: None,
            key_prefix: String::new(),
            lazy_connect: false,
            default_ttl: 0,
            timeout: default_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Endpoint for logs; the password is masked.
    pub fn display_url(&self) -> String {
        let auth = if self.password.is_some() { ":***@" } else { "" };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }
}

// == Memcached Config ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemcachedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `host:port` addresses; keys are distributed across them
    pub servers: Vec<String>,
    /// Milliseconds per attempt
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    /// Extra attempts after a failed operation
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default, rename = "defaultTTL")]
    pub default_ttl: u64,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            name: None,
            servers: vec!["localhost:11211".to_string()],
            timeout: default_timeout_ms(),
            retries: default_retries(),
            default_ttl: 0,
        }
    }
}

// == Provider Config ==
/// Configuration for one provider, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum ProviderConfig {
    Memory(MemoryConfig),
    Redis(RedisConfig),
    Memcached(MemcachedConfig),
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Memory(_) => ProviderType::Memory,
            ProviderConfig::Redis(_) => ProviderType::Redis,
            ProviderConfig::Memcached(_) => ProviderType::Memcached,
        }
    }

    /// Explicit name from the configuration, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            ProviderConfig::Memory(c) => c.name.as_deref(),
            ProviderConfig::Redis(c) => c.name.as_deref(),
            ProviderConfig::Memcached(c) => c.name.as_deref(),
        }
    }

    /// Default configuration for a type.
    pub fn template(provider_type: ProviderType) -> Self {
        match provider_type {
            ProviderType::Memory => ProviderConfig::Memory(MemoryConfig::default()),
            ProviderType::Redis => ProviderConfig::Redis(RedisConfig::default()),
            ProviderType::Memcached => ProviderConfig::Memcached(MemcachedConfig::default()),
        }
    }
}

fn default_max_size() -> usize {
    1000
}

fn default_memory_ttl() -> u64 {
    300
}

fn default_redis_port() -> u16 {
    6379
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retries() -> u32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_type_parse_is_case_insensitive() {
        assert_eq!("memory".parse::<ProviderType>().unwrap(), ProviderType::Memory);
        assert_eq!("REDIS".parse::<ProviderType>().unwrap(), ProviderType::Redis);
        assert_eq!(
            "Memcached".parse::<ProviderType>().unwrap(),
            ProviderType::Memcached
        );
        assert!(matches!(
            "mongo".parse::<ProviderType>(),
            Err(CacheError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_memory_config_defaults_from_json() {
        let config: ProviderConfig = serde_json::from_value(json!({"type": "MEMORY"})).unwrap();
        assert_eq!(config, ProviderConfig::Memory(MemoryConfig::default()));
    }

    #[test]
    fn test_redis_config_field_names() {
        let config: ProviderConfig = serde_json::from_value(json!({
            "type": "REDIS",
            "host": "cache.internal",
            "keyPrefix": "app:",
            "lazyConnect": true,
            "defaultTTL": 60
        }))
        .unwrap();

        match config {
            ProviderConfig::Redis(redis) => {
                assert_eq!(redis.host, "cache.internal");
                assert_eq!(redis.port, 6379);
                assert_eq!(redis.key_prefix, "app:");
                assert!(redis.lazy_connect);
                assert_eq!(redis.default_ttl, 60);
            }
            other => panic!("unexpected config {:?}", other),
        }
    }

    #[test]
    fn test_redis_display_url_masks_password() {
        let mut config = RedisConfig {
            host: "10.0.0.5".to_string(),
            db: 3,
            ..RedisConfig::default()
        };
        assert_eq!(config.display_url(), "redis://10.0.0.5:6379/3");

        config.password = Some("p@ss/w#rd".to_string());
        assert_eq!(config.display_url(), "redis://:***@10.0.0.5:6379/3");
    }

    #[test]
    fn test_template_serializes_with_type_tag() {
        let value = serde_json::to_value(ProviderConfig::template(ProviderType::Memcached)).unwrap();
        assert_eq!(value["type"], "MEMCACHED");
        assert_eq!(value["servers"][0], "localhost:11211");
    }
}
