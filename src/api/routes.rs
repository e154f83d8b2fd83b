//! API Routes
//!
//! Configures the Axum router with the monitoring endpoints.

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, provider_status_handler, stats_handler, status_handler, AppState,
};

/// Creates the monitoring router.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/status", get(status_handler))
        .route("/providers/:name/status", get(provider_status_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
