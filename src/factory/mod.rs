//! Cache Provider Factory
//!
//! Turns configuration into providers: type registry, validation, templates,
//! batch construction and fan-out of lifecycle calls across a provider set.
//! The factory remembers every provider it built so `shutdown` can release
//! them all at process teardown.

mod provider_set;
mod validation;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::CombinedStats;
use crate::config::{ProviderConfig, ProviderType};
use crate::distributed::DistributedCacheManager;
use crate::error::{CacheError, CacheResult};
use crate::providers::{
    CacheProvider, ConnectionTest, MemcachedProvider, MemoryProvider, RedisProvider,
};

pub use provider_set::ProviderSet;
pub use validation::{validate_configuration, ValidationResult};

/// Outcome of [`CacheProviderFactory::create_multiple_providers`].
#[derive(Debug, Default)]
pub struct CreatedProviders {
    pub providers: ProviderSet,
    /// One message per configuration entry that could not be built
    pub errors: Vec<String>,
}

// == Factory ==
/// Builds providers from configuration.
#[derive(Debug, Default)]
pub struct CacheProviderFactory {
    created: Mutex<Vec<Arc<dyn CacheProvider>>>,
}

impl CacheProviderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_supported_types(&self) -> &'static [ProviderType] {
        &ProviderType::ALL
    }

    /// Pure check of one configuration object; never connects.
    pub fn validate_configuration(&self, config: &Value) -> ValidationResult {
        validate_configuration(config)
    }

    /// Default, valid configuration for `provider_type`.
    pub fn create_configuration_template(&self, provider_type: &str) -> CacheResult<Value> {
        let provider_type: ProviderType = provider_type.parse()?;
        serde_json::to_value(ProviderConfig::template(provider_type))
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// Builds a disconnected provider of `provider_type` from `config`.
    ///
    /// The `type` argument wins over any `type` field inside `config`.
    pub fn create_provider(
        &self,
        provider_type: &str,
        config: &Value,
    ) -> CacheResult<Arc<dyn CacheProvider>> {
        let provider_type: ProviderType = provider_type.parse()?;

        let mut tagged = match config {
            Value::Object(object) => object.clone(),
            Value::Null => serde_json::Map::new(),
            _ => {
                return Err(CacheError::ConfigValidation(vec![
                    "configuration must be a JSON object".to_string(),
                ]))
            }
        };
        tagged.insert(
            "type".to_string(),
            Value::String(provider_type.as_str().to_string()),
        );
        let tagged = Value::Object(tagged);

        let result = validate_configuration(&tagged);
        if !result.valid {
            return Err(CacheError::ConfigValidation(result.errors));
        }

        let typed: ProviderConfig = serde_json::from_value(tagged)
            .map_err(|e| CacheError::ConfigValidation(vec![e.to_string()]))?;
        self.create_from_config(typed)
    }

    /// Builds a disconnected provider from an already typed configuration.
    pub fn create_from_config(
        &self,
        config: ProviderConfig,
    ) -> CacheResult<Arc<dyn CacheProvider>> {
        let provider_type = config.provider_type();
        let provider: Arc<dyn CacheProvider> = match config {
            ProviderConfig::Memory(config) => Arc::new(MemoryProvider::new(config)),
            ProviderConfig::Redis(config) => Arc::new(RedisProvider::new(config)?),
            ProviderConfig::Memcached(config) => Arc::new(MemcachedProvider::new(config)?),
        };

        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&provider));
        debug!(provider_type = %provider_type, "Cache provider created");
        Ok(provider)
    }

    /// Builds one provider per configuration entry.
    ///
    /// A bad entry is recorded in `errors` and skipped; only when no entry
    /// succeeds does the call fail.
    pub fn create_multiple_providers(&self, configs: &[Value]) -> CacheResult<CreatedProviders> {
        if configs.is_empty() {
            return Err(CacheError::ConfigValidation(vec![
                "at least one provider configuration is required".to_string(),
            ]));
        }

        let mut created = CreatedProviders::default();
        for (index, config) in configs.iter().enumerate() {
            let name = provider_name(index, config);
            match self.create_entry(&name, config, &created.providers) {
                Ok(provider) => {
                    created.providers.insert(name, provider);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "Skipping cache provider");
                    created.errors.push(format!("{}: {}", name, e));
                }
            }
        }

        if created.providers.is_empty() {
            return Err(CacheError::AllProvidersFailed(created.errors));
        }
        Ok(created)
    }

    fn create_entry(
        &self,
        name: &str,
        config: &Value,
        existing: &ProviderSet,
    ) -> CacheResult<Arc<dyn CacheProvider>> {
        if existing.contains(name) {
            return Err(CacheError::ConfigValidation(vec![format!(
                "duplicate provider name \"{}\"",
                name
            )]));
        }
        let provider_type = match config.get("type") {
            Some(Value::String(provider_type)) => provider_type.as_str(),
            _ => {
                return Err(CacheError::ConfigValidation(
                    validate_configuration(config).errors,
                ))
            }
        };
        self.create_provider(provider_type, config)
    }

    // == Fan-out ==
    /// Connects every provider concurrently; one failure does not affect the rest.
    pub async fn connect_multiple_providers(
        &self,
        providers: &ProviderSet,
    ) -> BTreeMap<String, CacheResult<()>> {
        let results = join_all(providers.iter().map(|(name, provider)| async move {
            let result = provider.connect().await;
            if let Err(e) = &result {
                warn!(provider = %name, error = %e, "Cache provider failed to connect");
            }
            (name.to_string(), result)
        }))
        .await;
        results.into_iter().collect()
    }

    pub async fn disconnect_multiple_providers(
        &self,
        providers: &ProviderSet,
    ) -> BTreeMap<String, CacheResult<()>> {
        let results = join_all(providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.disconnect().await)
        }))
        .await;
        results.into_iter().collect()
    }

    pub async fn test_multiple_connections(
        &self,
        providers: &ProviderSet,
    ) -> BTreeMap<String, ConnectionTest> {
        let results = join_all(providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.test_connection().await)
        }))
        .await;
        results.into_iter().collect()
    }

    pub async fn get_combined_stats(&self, providers: &ProviderSet) -> CombinedStats {
        let snapshots = join_all(providers.iter().map(|(name, provider)| async move {
            (name.to_string(), provider.get_stats().await)
        }))
        .await;
        CombinedStats::from_snapshots(snapshots)
    }

    /// Builds a distributed cache straight from configuration, in list order.
    pub fn create_distributed_cache(&self, configs: &[Value]) -> CacheResult<DistributedCacheManager> {
        let created = self.create_multiple_providers(configs)?;
        for error in &created.errors {
            warn!(error = %error, "Distributed cache built without provider");
        }
        DistributedCacheManager::new(created.providers)
    }

    /// Number of providers this factory has built and not yet shut down.
    pub fn tracked_providers(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Disconnects every provider this factory built.
    pub async fn shutdown(&self) {
        let providers =
            std::mem::take(&mut *self.created.lock().unwrap_or_else(PoisonError::into_inner));
        if providers.is_empty() {
            return;
        }

        let results = join_all(providers.iter().map(|provider| provider.disconnect())).await;
        let failures = results.iter().filter(|result| result.is_err()).count();
        if failures > 0 {
            warn!(failures = failures, "Some cache providers failed to disconnect");
        }
        info!(providers = providers.len(), "Cache providers shut down");
    }
}

/// Explicit `name`, or `<type>-<index>` in lowercase.
fn provider_name(index: usize, config: &Value) -> String {
    if let Some(name) = config.get("name").and_then(Value::as_str) {
        if !name.trim().is_empty() {
            return name.to_string();
        }
    }
    let kind = config
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("provider")
        .to_ascii_lowercase();
    format!("{}-{}", kind, index)
}
