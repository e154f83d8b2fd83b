//! Response models for the monitoring API
//!
//! DTOs serialized by the read-only HTTP surface of the host binary.

pub mod responses;

pub use responses::{HealthResponse, ProviderStatusResponse};
