//! API Module
//!
//! Read-only HTTP monitoring surface over the distributed cache.
//!
//! # Endpoints
//! - `GET /health` - Connection test per provider
//! - `GET /stats` - Combined statistics
//! - `GET /status` - Distributed status
//! - `GET /providers/:name/status` - Status and detailed stats of one provider

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
