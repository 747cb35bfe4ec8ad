//! Observability infrastructure for the pool agent
//!
//! Provides:
//! - Prometheus metrics (report latency, report/watch outcomes, applied changes, per-pool gauges)
//! - Structured JSON logging with tracing

use crate::models::PoolWorkState;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for controller round-trips (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    report_latency_seconds: Histogram,
    reports_sent: IntCounter,
    report_failures: IntCounter,
    watch_polls: IntCounterVec,
    config_changes: IntCounterVec,
    pools_registered: IntGauge,
    pool_queue_size: IntGaugeVec,
    pool_queue_capacity: IntGaugeVec,
    pool_active_count: IntGaugeVec,
    pool_core_size: IntGaugeVec,
    pool_max_size: IntGaugeVec,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            report_latency_seconds: register_histogram!(
                "pool_agent_report_latency_seconds",
                "Round-trip time of worker-state pushes to the controller",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register report_latency_seconds"),

            reports_sent: register_int_counter!(
                "pool_agent_reports_sent_total",
                "Worker-state snapshots delivered to the controller"
            )
            .expect("Failed to register reports_sent"),

            report_failures: register_int_counter!(
                "pool_agent_report_failures_total",
                "Worker-state snapshots the controller did not accept"
            )
            .expect("Failed to register report_failures"),

            watch_polls: register_int_counter_vec!(
                "pool_agent_watch_polls_total",
                "Completed watch exchanges by outcome",
                &["outcome"]
            )
            .expect("Failed to register watch_polls"),

            config_changes: register_int_counter_vec!(
                "pool_agent_config_changes_total",
                "Configuration changes processed by result",
                &["result"]
            )
            .expect("Failed to register config_changes"),

            pools_registered: register_int_gauge!(
                "pool_agent_pools_registered",
                "Number of pools managed by this agent"
            )
            .expect("Failed to register pools_registered"),

            pool_queue_size: register_int_gauge_vec!(
                "pool_agent_pool_queue_size",
                "Items waiting in the pool's queue at the last snapshot",
                &["pool"]
            )
            .expect("Failed to register pool_queue_size"),

            pool_queue_capacity: register_int_gauge_vec!(
                "pool_agent_pool_queue_capacity",
                "Configured queue bound (0 = unbounded)",
                &["pool"]
            )
            .expect("Failed to register pool_queue_capacity"),

            pool_active_count: register_int_gauge_vec!(
                "pool_agent_pool_active_count",
                "Threads executing tasks at the last snapshot",
                &["pool"]
            )
            .expect("Failed to register pool_active_count"),

            pool_core_size: register_int_gauge_vec!(
                "pool_agent_pool_core_size",
                "Configured core pool size",
                &["pool"]
            )
            .expect("Failed to register pool_core_size"),

            pool_max_size: register_int_gauge_vec!(
                "pool_agent_pool_max_size",
                "Configured maximum pool size",
                &["pool"]
            )
            .expect("Failed to register pool_max_size"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_report_latency(&self, duration_secs: f64) {
        self.inner().report_latency_seconds.observe(duration_secs);
    }

    pub fn inc_reports_sent(&self) {
        self.inner().reports_sent.inc();
    }

    pub fn inc_report_failures(&self) {
        self.inner().report_failures.inc();
    }

    /// Count a watch exchange (`not_modified`, `changed` or `error`)
    pub fn inc_watch_poll(&self, outcome: &str) {
        self.inner().watch_polls.with_label_values(&[outcome]).inc();
    }

    /// Count a processed change (`applied`, `partial`, `rejected`, `not_found`)
    pub fn inc_config_change(&self, result: &str) {
        self.inner().config_changes.with_label_values(&[result]).inc();
    }

    pub fn set_pools_registered(&self, count: i64) {
        self.inner().pools_registered.set(count);
    }

    /// Publish one pool's snapshot as gauges
    pub fn record_pool_state(&self, state: &PoolWorkState) {
        let inner = self.inner();
        let pool = [state.config.pool_name.as_str()];
        inner
            .pool_queue_size
            .with_label_values(&pool)
            .set(state.queue_size as i64);
        inner
            .pool_queue_capacity
            .with_label_values(&pool)
            .set(state.config.queue_capacity as i64);
        inner
            .pool_active_count
            .with_label_values(&pool)
            .set(state.active_count as i64);
        inner
            .pool_core_size
            .with_label_values(&pool)
            .set(state.config.core_pool_size as i64);
        inner
            .pool_max_size
            .with_label_values(&pool)
            .set(state.config.maximum_pool_size as i64);
    }
}

/// Structured logger for agent events
///
/// Emits consistent `event = "..."` records for lifecycle, reporting
/// and configuration changes.
#[derive(Clone)]
pub struct StructuredLogger {
    app_name: String,
}

impl StructuredLogger {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, pools: usize) {
        info!(
            event = "agent_started",
            app = %self.app_name,
            agent_version = %version,
            pools = pools,
            "Pool agent started"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            app = %self.app_name,
            reason = %reason,
            "Pool agent shutting down"
        );
    }

    /// Log the outcome of the one-time init registration
    pub fn log_initial_report(&self, pools: usize, version: Option<&str>) {
        match version {
            Some(version) => info!(
                event = "initial_report",
                app = %self.app_name,
                pools = pools,
                controller_version = %version,
                "Initial pool configuration reported, controller returned latest version"
            ),
            None => warn!(
                event = "initial_report_failed",
                app = %self.app_name,
                pools = pools,
                "Initial pool configuration report was not accepted"
            ),
        }
    }

    /// Log a failed push to the controller
    pub fn log_report_failure(&self, endpoint: &str, error: &str) {
        warn!(
            event = "report_failed",
            app = %self.app_name,
            endpoint = %endpoint,
            error = %error,
            "Controller report failed, waiting for next cycle"
        );
    }

    /// Log a configuration change that was applied
    pub fn log_config_applied(&self, pool: &str, fields: &[&'static str]) {
        info!(
            event = "config_applied",
            app = %self.app_name,
            pool = %pool,
            fields = ?fields,
            "Pool configuration updated"
        );
    }

    /// Log a configuration field or change that was refused
    pub fn log_config_rejected(&self, pool: &str, field: &str, reason: &str) {
        warn!(
            event = "config_rejected",
            app = %self.app_name,
            pool = %pool,
            field = %field,
            reason = %reason,
            "Pool configuration change rejected"
        );
    }

    /// Log one pool's live status
    pub fn log_pool_status(&self, state: &PoolWorkState) {
        debug!(
            event = "pool_status",
            app = %self.app_name,
            pool = %state.config.pool_name,
            core = state.config.core_pool_size,
            max = state.config.maximum_pool_size,
            pool_size = state.pool_size,
            active = state.active_count,
            largest = state.largest_pool_size,
            queue_size = state.queue_size,
            queue_capacity = state.config.queue_capacity,
            queue_remaining = state.queue_remaining_capacity,
            completed = state.completed_task_count,
            tasks = state.task_count,
            "Pool status"
        );
    }
}
