//! Cache Providers - monitoring server
//!
//! Builds the configured providers, chains them into a distributed cache and
//! serves a read-only status API over it.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_providers::api::create_router;
use cache_providers::{spawn_health_task, AppState, CacheProviderFactory, Config};

/// Main entry point for the cache monitoring server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the providers and connect the distributed cache
/// 4. Start background health task
/// 5. Serve the monitoring router on the configured port
/// 6. On SIGINT/SIGTERM stop the task and disconnect every provider
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_providers=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache providers server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: providers={}, port={}, health_check_interval={}s",
        config.providers.len(),
        config.server_port,
        config.health_check_interval
    );

    let factory = CacheProviderFactory::new();
    let cache = Arc::new(
        factory
            .create_distributed_cache(&config.providers)
            .context("failed to build cache providers")?,
    );
    if let Err(e) = cache.connect().await {
        warn!(error = %e, "No cache provider connected, serving in degraded mode");
    }
    info!(
        providers = ?cache.providers().names().collect::<Vec<_>>(),
        "Distributed cache ready"
    );

    let health_handle = spawn_health_task(Arc::clone(&cache), config.health_check_interval);
    info!("Background health task started");

    let app = create_router(AppState::new(cache));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(health_handle))
        .await
        .context("server error")?;

    factory.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the health task.
async fn shutdown_signal(health_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    health_handle.abort();
    warn!("Health task aborted");
}
