//! Error types for the cache layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for providers, the factory and the distributed manager.
///
/// Two classes live here. Operational failures (`Connection`, `Timeout`,
/// `Backend`, `Serialization`, `InvalidKey`) are swallowed on the data path and
/// only show up in statistics and provider status. Everything else is a
/// configuration or programmer error and is returned to the caller.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backend unreachable or connection not established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend did not answer within the configured timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Backend answered with an error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key rejected by the backend's key rules
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Provider type outside the supported set
    #[error("Unsupported provider type: {0}")]
    UnsupportedType(String),

    /// Configuration failed validation; carries every violation found
    #[error("Invalid configuration: {}", .0.join("; "))]
    ConfigValidation(Vec<String>),

    /// Stored value is not an integer (or the result left the i64 range)
    #[error("Type mismatch for key '{key}': {reason}")]
    TypeMismatch { key: String, reason: String },

    /// No provider registered under this name
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    /// Every provider in a batch or failover chain failed
    #[error("All providers failed: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),
}

impl CacheError {
    /// Returns true for backend/runtime failures that the data path absorbs.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            CacheError::Connection(_)
                | CacheError::Timeout(_)
                | CacheError::Backend(_)
                | CacheError::Serialization(_)
                | CacheError::InvalidKey(_)
        )
    }

    pub(crate) fn type_mismatch(key: &str, reason: impl Into<String>) -> Self {
        CacheError::TypeMismatch {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            CacheError::UnsupportedType(_)
            | CacheError::ConfigValidation(_)
            | CacheError::InvalidKey(_)
            | CacheError::TypeMismatch { .. } => StatusCode::BAD_REQUEST,
            CacheError::Connection(_)
            | CacheError::Timeout(_)
            | CacheError::AllProvidersFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Backend(_) | CacheError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache layer.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
