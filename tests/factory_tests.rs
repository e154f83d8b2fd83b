//! Integration Tests for the provider factory
//!
//! Construction, validation, templates and fan-out over provider sets.

use cache_providers::{CacheError, CacheProviderFactory, ProviderType};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};

fn unreachable_redis(name: &str) -> Value {
    json!({"type": "REDIS", "name": name, "host": "127.0.0.1", "port": 1, "timeout": 200})
}

// == Registry and Templates ==

#[test]
fn test_supported_types_are_closed_set() {
    let factory = CacheProviderFactory::new();
    assert_eq!(
        factory.get_supported_types(),
        &[ProviderType::Memory, ProviderType::Redis, ProviderType::Memcached]
    );
}

#[test]
fn test_templates_validate_and_build() {
    let factory = CacheProviderFactory::new();

    for provider_type in ["MEMORY", "REDIS", "MEMCACHED"] {
        let template = assert_ok!(factory.create_configuration_template(provider_type));
        assert_eq!(template["type"], provider_type);

        let result = factory.validate_configuration(&template);
        assert!(result.valid, "{}: {:?}", provider_type, result.errors);

        let provider = assert_ok!(factory.create_provider(provider_type, &template));
        assert_eq!(provider.provider_type().as_str(), provider_type);
    }
}

#[test]
fn test_unsupported_type() {
    let factory = CacheProviderFactory::new();
    let result = factory.create_provider("DYNAMO", &json!({}));
    assert!(matches!(result, Err(CacheError::UnsupportedType(ref t)) if t == "DYNAMO"));
}

// == Validation ==

#[test]
fn test_invalid_config_aggregates_every_violation() {
    let factory = CacheProviderFactory::new();
    let result = factory.create_provider(
        "MEMORY",
        &json!({"maxSize": "lots", "evictionPolicy": "MRU", "defaultTTL": true}),
    );

    match result {
        Err(CacheError::ConfigValidation(errors)) => {
            assert_eq!(errors.len(), 3, "{:?}", errors);
            assert!(errors.iter().any(|e| e.starts_with("maxSize")));
            assert!(errors.iter().any(|e| e.starts_with("evictionPolicy")));
            assert!(errors.iter().any(|e| e.starts_with("defaultTTL")));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_validation_is_pure_and_deterministic() {
    let factory = CacheProviderFactory::new();
    // Would hang on connect if validation ever touched the network
    let config = json!({"type": "REDIS", "host": "10.255.255.1", "port": "6379"});

    let first = factory.validate_configuration(&config);
    let second = factory.validate_configuration(&config);

    assert_eq!(first, second);
    assert!(!first.valid);
    assert_eq!(first.errors, vec!["port must be an integer, got string"]);
    assert_eq!(factory.tracked_providers(), 0);
}

// == Batch Construction ==

#[test]
fn test_create_multiple_isolates_failures() {
    let factory = CacheProviderFactory::new();
    let configs = vec![
        json!({"type": "MEMORY"}),
        json!({"type": "MEMORY", "maxSize": -5}),
        json!({"type": "SQLITE"}),
        json!({"type": "MEMCACHED", "name": "mc", "servers": ["127.0.0.1:1"]}),
    ];

    let created = assert_ok!(factory.create_multiple_providers(&configs));

    assert_eq!(created.providers.names().collect::<Vec<_>>(), vec!["memory-0", "mc"]);
    assert_eq!(created.errors.len(), 2);
    assert!(created.errors[0].starts_with("memory-1:"));
    assert!(created.errors[1].starts_with("sqlite-2:"));
}

#[test]
fn test_create_multiple_rejects_duplicate_names() {
    let factory = CacheProviderFactory::new();
    let configs = vec![
        json!({"type": "MEMORY", "name": "cache"}),
        json!({"type": "MEMORY", "name": "cache"}),
    ];

    let created = assert_ok!(factory.create_multiple_providers(&configs));
    assert_eq!(created.providers.len(), 1);
    assert!(created.errors[0].contains("duplicate provider name"));
}

#[test]
fn test_create_multiple_all_failed() {
    let factory = CacheProviderFactory::new();
    let configs = vec![json!({"type": "NOPE"}), json!({"maxSize": 1})];

    let result = factory.create_multiple_providers(&configs);
    match result {
        Err(CacheError::AllProvidersFailed(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected AllProvidersFailed, got {:?}", other),
    }
    assert_err!(factory.create_multiple_providers(&[]));
}

// == Fan-out ==

#[tokio::test]
async fn test_connect_multiple_isolates_failures() {
    let factory = CacheProviderFactory::new();
    let configs = vec![json!({"type": "MEMORY", "name": "mem"}), unreachable_redis("redis")];
    let created = assert_ok!(factory.create_multiple_providers(&configs));

    let results = factory.connect_multiple_providers(&created.providers).await;
    assert_ok!(&results["mem"]);
    assert_err!(&results["redis"]);

    let tests = factory.test_multiple_connections(&created.providers).await;
    assert!(tests["mem"].success);
    assert!(!tests["redis"].success);

    let disconnected = factory.disconnect_multiple_providers(&created.providers).await;
    assert!(disconnected.values().all(|result| result.is_ok()));
}

#[tokio::test]
async fn test_combined_stats() {
    let factory = CacheProviderFactory::new();
    let configs = vec![
        json!({"type": "MEMORY", "name": "a"}),
        json!({"type": "MEMORY", "name": "b"}),
    ];
    let created = assert_ok!(factory.create_multiple_providers(&configs));
    factory.connect_multiple_providers(&created.providers).await;

    let a = created.providers.get("a").unwrap();
    let b = created.providers.get("b").unwrap();
    a.set("x", &json!(1), None).await;
    a.get("x").await;
    b.get("x").await;
    b.get("y").await;

    let combined = factory.get_combined_stats(&created.providers).await;
    assert_eq!(combined.providers["a"].hits, 1);
    assert_eq!(combined.providers["b"].misses, 2);
    assert_eq!(combined.total.hits, 1);
    assert_eq!(combined.total.misses, 2);
    assert_eq!(combined.total.sets, 1);
}

#[tokio::test]
async fn test_distributed_cache_from_config_and_shutdown() {
    let factory = CacheProviderFactory::new();
    let configs = vec![
        json!({"type": "MEMORY", "name": "l1"}),
        json!({"type": "MEMORY", "name": "l2"}),
    ];

    let cache = assert_ok!(factory.create_distributed_cache(&configs));
    assert_ok!(cache.connect().await);
    assert!(cache.set("k", &json!("v"), Some(60)).await);
    assert_eq!(cache.get("k").await, Some(json!("v")));
    assert_eq!(factory.tracked_providers(), 2);

    factory.shutdown().await;

    let status = cache.get_status().await;
    assert!(!status.connected);
    assert_eq!(factory.tracked_providers(), 0);
}
