//! Agent library for dynamic thread pool management
//!
//! This crate provides the core functionality for:
//! - Live-resizable bounded work queues
//! - A registry of managed pool handles
//! - Periodic pool state reporting to the controller
//! - Long-poll watching and application of configuration changes
//! - Health checks and observability

pub mod controller;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pool;
pub mod reporter;
pub mod watcher;

pub use error::{AgentError, Result};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
