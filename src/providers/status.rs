//! Provider connection status bookkeeping.

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::ProviderType;

/// Snapshot of a provider's connection state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub connected: bool,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Seconds since the current connection was established
    pub uptime: Option<u64>,
    /// Most recent operational failure, kept across reconnects
    pub last_error: Option<String>,
}

/// Outcome of a health-check round trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    /// Round-trip time in milliseconds
    pub latency: u64,
    pub error: Option<String>,
}

impl ConnectionTest {
    pub fn passed(latency: Duration) -> Self {
        Self {
            success: true,
            latency: latency.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(latency: Duration, error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency: latency.as_millis() as u64,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Default)]
struct StatusState {
    connected_at: Option<Instant>,
    last_error: Option<String>,
}

// == Status Tracker ==
/// Shared connection-state bookkeeping used by every provider.
///
/// Starts disconnected.
#[derive(Debug)]
pub struct StatusTracker {
    provider_type: ProviderType,
    state: RwLock<StatusState>,
}

impl StatusTracker {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type,
            state: RwLock::new(StatusState::default()),
        }
    }

    /// Marks the provider connected; uptime keeps counting if it already was.
    pub async fn mark_connected(&self) {
        let mut state = self.state.write().await;
        if state.connected_at.is_none() {
            state.connected_at = Some(Instant::now());
        }
    }

    pub async fn mark_disconnected(&self) {
        self.state.write().await.connected_at = None;
    }

    pub async fn record_error(&self, error: impl ToString) {
        self.state.write().await.last_error = Some(error.to_string());
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connected_at.is_some()
    }

    pub async fn snapshot(&self) -> ProviderStatus {
        let state = self.state.read().await;
        ProviderStatus {
            connected: state.connected_at.is_some(),
            provider_type: self.provider_type,
            uptime: state.connected_at.map(|at| at.elapsed().as_secs()),
            last_error: state.last_error.clone(),
        }
    }
}
