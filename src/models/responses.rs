//! Response DTOs for the monitoring API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::DetailedStats;
use crate::providers::{ConnectionTest, ProviderStatus};

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" or "unhealthy"
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    pub healthy_providers: usize,
    pub total_providers: usize,
    /// Connection test per provider name
    pub providers: BTreeMap<String, ConnectionTest>,
}

impl HealthResponse {
    /// Summarises per-provider connection tests.
    ///
    /// Degraded means some, but not all, providers answered.
    pub fn from_tests(providers: BTreeMap<String, ConnectionTest>) -> Self {
        let healthy_providers = providers.values().filter(|test| test.success).count();
        let total_providers = providers.len();
        let status = if healthy_providers == 0 {
            "unhealthy"
        } else if healthy_providers < total_providers {
            "degraded"
        } else {
            "healthy"
        };

        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            healthy_providers,
            total_providers,
            providers,
        }
    }

    /// True while at least one provider is usable.
    pub fn is_usable(&self) -> bool {
        self.healthy_providers > 0
    }
}

/// Response body for a single provider (GET /providers/:name/status)
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatusResponse {
    pub name: String,
    pub status: ProviderStatus,
    pub stats: DetailedStats,
}

impl ProviderStatusResponse {
    pub fn new(name: impl Into<String>, status: ProviderStatus, stats: DetailedStats) -> Self {
        Self {
            name: name.into(),
            status,
            stats,
        }
    }
}
