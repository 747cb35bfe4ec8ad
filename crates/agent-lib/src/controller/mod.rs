//! Controller wire contract
//!
//! The agent talks to the controller through three endpoints:
//! - `init`: one-time registration of every pool's static configuration
//! - `worker-state`: periodic telemetry push
//! - `watch`: long-poll for configuration changes

mod client;

pub use client::{ClientConfig, ControllerClientBuilder, HttpControllerClient};

use crate::error::Result;
use crate::models::{InitReport, WorkerStateReport};
use async_trait::async_trait;

/// Path of the bootstrap registration endpoint
pub const INIT_PATH: &str = "/init";
/// Path of the telemetry endpoint
pub const WORKER_STATE_PATH: &str = "/workerState";
/// Path of the long-poll watch endpoint
pub const WATCH_PATH: &str = "/watch";
/// Query parameter carrying the agent's identity on watch
pub const APP_NAME_PARAM: &str = "appName";

/// Outcome of one watch exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchResponse {
    /// Long-poll elapsed without a change (HTTP 304)
    NotModified,
    /// Controller pushed a change; body holds the change payload
    Changed(String),
}

/// Request/response primitive for the controller endpoints
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Register the agent's pools; returns the controller's latest version
    async fn init(&self, report: &InitReport) -> Result<String>;

    /// Push a live snapshot of every pool
    async fn report_worker_state(&self, report: &WorkerStateReport) -> Result<()>;

    /// Block until the controller signals a change or its long-poll elapses
    async fn watch(&self, app_name: &str) -> Result<WatchResponse>;
}
