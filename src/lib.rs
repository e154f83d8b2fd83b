//! Cache Providers - a provider-agnostic cache layer
//!
//! Memory, Redis and Memcached backends behind one contract, a factory that
//! builds them from configuration, and a distributed manager that chains them
//! with ordered failover.

pub mod api;
pub mod cache;
pub mod config;
pub mod distributed;
pub mod error;
pub mod factory;
pub mod models;
pub mod providers;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheValue;
pub use config::{Config, ProviderConfig, ProviderType};
pub use distributed::DistributedCacheManager;
pub use error::{CacheError, CacheResult};
pub use factory::{CacheProviderFactory, ProviderSet, ValidationResult};
pub use providers::CacheProvider;
pub use tasks::spawn_health_task;
