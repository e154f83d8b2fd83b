//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Health probe: runs every provider's connection test and logs degraded ones

mod health;

pub use health::spawn_health_task;
