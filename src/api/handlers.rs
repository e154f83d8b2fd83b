//! API Handlers
//!
//! HTTP request handlers for each monitoring endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::distributed::{DistributedCacheManager, DistributedStats, DistributedStatus};
use crate::error::CacheResult;
use crate::models::{HealthResponse, ProviderStatusResponse};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<DistributedCacheManager>,
}

impl AppState {
    pub fn new(cache: Arc<DistributedCacheManager>) -> Self {
        Self { cache }
    }
}

/// Handler for GET /health
///
/// 200 while any provider passes its connection test, 503 otherwise.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse::from_tests(state.cache.test_connection().await);
    let status = if response.is_usable() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<DistributedStats> {
    Json(state.cache.get_stats().await)
}

/// Handler for GET /status
pub async fn status_handler(State(state): State<AppState>) -> Json<DistributedStatus> {
    Json(state.cache.get_status().await)
}

/// Handler for GET /providers/:name/status
pub async fn provider_status_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> CacheResult<Json<ProviderStatusResponse>> {
    let provider = state.cache.provider(&name)?;
    let status = provider.get_status().await;
    let stats = provider.get_detailed_stats().await;

    Ok(Json(ProviderStatusResponse::new(name, status, stats)))
}
