//! Configuration Module
//!
//! Provider configuration types plus the host binary's bootstrap settings,
//! loaded from environment variables.

mod provider;

use std::env;

use serde_json::Value;
use tracing::warn;

pub use provider::{
    EvictionPolicy, MemcachedConfig, MemoryConfig, ProviderConfig, ProviderType, RedisConfig,
};

/// Host binary configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Raw provider configurations, in failover order
    pub providers: Vec<Value>,
    /// HTTP port of the monitoring surface
    pub server_port: u16,
    /// Seconds between background connection tests
    pub health_check_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_PROVIDERS` - JSON array of provider configs (default: one memory provider)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `HEALTH_CHECK_INTERVAL` - Health probe frequency in seconds (default: 30)
    pub fn from_env() -> Self {
        Self {
            providers: env::var("CACHE_PROVIDERS")
                .ok()
                .and_then(|raw| parse_providers(&raw))
                .unwrap_or_else(default_providers),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            health_check_interval: env::var("HEALTH_CHECK_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            server_port: 3000,
            health_check_interval: 30,
        }
    }
}

fn parse_providers(raw: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(providers) if !providers.is_empty() => Some(providers),
        Ok(_) => {
            warn!("CACHE_PROVIDERS is empty, falling back to the default memory provider");
            None
        }
        Err(e) => {
            warn!(error = %e, "CACHE_PROVIDERS is not a JSON array, falling back to the default memory provider");
            None
        }
    }
}

fn default_providers() -> Vec<Value> {
    serde_json::to_value(ProviderConfig::template(ProviderType::Memory))
        .map(|template| vec![template])
        .unwrap_or_default()
}
