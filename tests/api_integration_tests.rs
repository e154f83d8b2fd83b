//! Integration Tests for the monitoring API
//!
//! Tests the full request/response cycle for each endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cache_providers::{api::create_router, AppState, CacheProviderFactory};
use serde_json::{json, Value};
use tower::ServiceExt;

// == Helper Functions ==

async fn create_test_app(configs: Value) -> Router {
    let configs: Vec<Value> = serde_json::from_value(configs).unwrap();
    let factory = CacheProviderFactory::new();
    let cache = factory.create_distributed_cache(&configs).unwrap();
    let _ = cache.connect().await;
    create_router(AppState::new(Arc::new(cache)))
}

async fn memory_app() -> Router {
    create_test_app(json!([
        {"type": "MEMORY", "name": "l1", "maxSize": 10},
        {"type": "MEMORY", "name": "l2", "maxSize": 100}
    ]))
    .await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint_all_healthy() {
    let (status, json) = get(memory_app().await, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["total_providers"], 2);
    assert_eq!(json["providers"]["l1"]["success"], true);
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_endpoint_degraded_but_up() {
    let app = create_test_app(json!([
        {"type": "REDIS", "name": "down", "host": "127.0.0.1", "port": 1, "timeout": 200},
        {"type": "MEMORY", "name": "fallback"}
    ]))
    .await;

    let (status, json) = get(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["providers"]["down"]["success"], false);
    assert_eq!(json["providers"]["fallback"]["success"], true);
}

#[tokio::test]
async fn test_health_endpoint_unavailable() {
    let app = create_test_app(json!([
        {"type": "MEMCACHED", "name": "down", "servers": ["127.0.0.1:1"], "timeout": 200, "retries": 0}
    ]))
    .await;

    let (status, json) = get(app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
}

// == Stats / Status Endpoint Tests ==

#[tokio::test]
async fn test_stats_endpoint() {
    let (status, json) = get(memory_app().await, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["distributed"], true);
    assert_eq!(json["total"]["hits"], 0);
    assert!(json["providers"]["l1"].is_object());
    assert!(json["providers"]["l2"].is_object());
}

#[tokio::test]
async fn test_status_endpoint() {
    let (status, json) = get(memory_app().await, "/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["distributed"], true);
    assert_eq!(json["mode"], "failover");
    assert_eq!(json["connected"], true);
    assert_eq!(json["providers"]["l1"]["type"], "MEMORY");
}

#[tokio::test]
async fn test_provider_status_endpoint() {
    let (status, json) = get(memory_app().await, "/providers/l2/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "l2");
    assert_eq!(json["status"]["connected"], true);
    assert_eq!(json["stats"]["backend"]["maxSize"], "100");
}

#[tokio::test]
async fn test_provider_status_unknown_provider() {
    let (status, json) = get(memory_app().await, "/providers/l9/status").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("l9"));
}

#[tokio::test]
async fn test_unknown_route() {
    let response = memory_app()
        .await
        .oneshot(Request::builder().uri("/get/key").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
