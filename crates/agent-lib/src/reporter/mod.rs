//! Pool state reporting
//!
//! Builds point-in-time snapshots of every registered pool and pushes them
//! to the controller. Reporting is best-effort: a failed push is logged and
//! dropped, and the next tick sends fresher data. The reporter never
//! schedules itself; see [`ReportLoop`] for the periodic driver.

mod r#loop;

pub use r#loop::{ReportConfig, ReportLoop, ReportLoopBuilder};

use crate::controller::{ControllerApi, INIT_PATH, WORKER_STATE_PATH};
use crate::error::{AgentError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::{AppIdentity, InitReport, WorkerStateReport};
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::pool::PoolRegistry;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Builds and pushes pool snapshots
pub struct StateReporter {
    identity: AppIdentity,
    registry: Arc<PoolRegistry>,
    controller: Arc<dyn ControllerApi>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
    /// Resolved once at construction; `None` when resolution failed
    instant_name: Option<String>,
}

impl StateReporter {
    pub fn new(
        identity: AppIdentity,
        registry: Arc<PoolRegistry>,
        controller: Arc<dyn ControllerApi>,
    ) -> Self {
        let logger = StructuredLogger::new(identity.app_name.clone());
        let instant_name = match local_hostname() {
            Ok(host) => Some(host),
            Err(e) => {
                warn!(error = %e, "Host name unavailable, reporting without it");
                None
            }
        };

        Self {
            identity,
            registry,
            controller,
            metrics: AgentMetrics::new(),
            logger,
            health: None,
            instant_name,
        }
    }

    /// Override the host name sent with worker-state reports
    pub fn with_instant_name(mut self, instant_name: Option<String>) -> Self {
        self.instant_name = instant_name;
        self
    }

    /// Record cycle outcomes in the given health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Static configuration of every pool, no live metrics
    pub fn build_init_report(&self) -> InitReport {
        let mut pools = Vec::with_capacity(self.registry.len());
        self.registry.for_each(|handle| pools.push(handle.config_info()));

        InitReport {
            app_name: self.identity.app_name.clone(),
            thread_pool_config_list: pools,
        }
    }

    /// Full snapshot: identity, host and every pool's live metrics
    pub fn build_worker_state(&self) -> WorkerStateReport {
        let mut pools = Vec::with_capacity(self.registry.len());
        self.registry.for_each(|handle| {
            let state = handle.work_state();
            self.logger.log_pool_status(&state);
            self.metrics.record_pool_state(&state);
            pools.push(state);
        });

        WorkerStateReport {
            app_name: self.identity.app_name.clone(),
            app_port: self.identity.app_port,
            instant_name: self.instant_name.clone(),
            thread_pool_config_list: pools,
        }
    }

    /// Register every pool's static configuration with the controller.
    ///
    /// Returns the controller's latest version, or `None` when the push
    /// failed. Failures are logged, never propagated.
    pub async fn initial_report(&self) -> Option<String> {
        let report = self.build_init_report();
        let pools = report.thread_pool_config_list.len();
        self.metrics.set_pools_registered(pools as i64);

        match self.controller.init(&report).await {
            Ok(version) => {
                self.logger.log_initial_report(pools, Some(&version));
                self.record_success();
                Some(version)
            }
            Err(e) => {
                self.logger.log_report_failure(INIT_PATH, &e.to_string());
                self.logger.log_initial_report(pools, None);
                self.record_failure(&e);
                None
            }
        }
    }

    /// Push a live snapshot of every pool. Returns whether the controller
    /// accepted it. Failures are logged and not retried.
    pub async fn timing_report(&self) -> bool {
        let report = self.build_worker_state();
        let start = Instant::now();

        let result = self.controller.report_worker_state(&report).await;
        self.metrics
            .observe_report_latency(start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                self.metrics.inc_reports_sent();
                self.record_success();
                debug!(
                    pools = report.thread_pool_config_list.len(),
                    "Worker state reported"
                );
                true
            }
            Err(e) => {
                self.metrics.inc_report_failures();
                self.logger
                    .log_report_failure(WORKER_STATE_PATH, &e.to_string());
                self.record_failure(&e);
                false
            }
        }
    }

    fn record_success(&self) {
        if let Some(health) = &self.health {
            health.record_success(components::REPORTER);
        }
    }

    fn record_failure(&self, error: &AgentError) {
        if let Some(health) = &self.health {
            health.record_failure(components::REPORTER, error.to_string());
        }
    }
}

/// Resolve the local host name from the environment or `/etc/hostname`
fn local_hostname() -> Result<String> {
    if let Ok(host) = std::env::var("HOSTNAME") {
        let host = host.trim();
        if !host.is_empty() {
            return Ok(host.to_string());
        }
    }

    match std::fs::read_to_string("/etc/hostname") {
        Ok(contents) if !contents.trim().is_empty() => Ok(contents.trim().to_string()),
        Ok(_) => Err(AgentError::HostResolution("/etc/hostname is empty".to_string())),
        Err(e) => Err(AgentError::HostResolution(format!("/etc/hostname: {}", e))),
    }
}
