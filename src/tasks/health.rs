//! Provider Health Task
//!
//! Background task that periodically tests every provider's connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::distributed::DistributedCacheManager;

/// Spawns a background task that runs the connection tests every
/// `interval_secs` seconds and logs providers that fail them.
///
/// Returns the JoinHandle so the task can be aborted during graceful shutdown.
pub fn spawn_health_task(cache: Arc<DistributedCacheManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting provider health task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let results = cache.test_connection().await;
            let failing: Vec<_> = results.iter().filter(|(_, test)| !test.success).collect();

            for (name, test) in &failing {
                warn!(
                    provider = %name,
                    latency_ms = test.latency,
                    error = test.error.as_deref().unwrap_or("unknown"),
                    "Cache provider failed its health check"
                );
            }

            if failing.is_empty() {
                debug!(providers = results.len(), "All cache providers healthy");
            } else if failing.len() == results.len() {
                warn!("No cache provider is reachable");
            }
        }
    })
}
