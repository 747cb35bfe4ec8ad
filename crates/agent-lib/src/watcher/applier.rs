//! Applies configuration changes to live pools
//!
//! Fields are written in a fixed order: keep-alive, pool sizes, queue
//! capacity. Each write is individually atomic, so a change that is only
//! partly valid leaves the pool consistent with whatever subset succeeded.
//!
//! Pool size policy: a change that would leave `core > max`, or either size
//! at zero or below, is rejected for that field and the previous value is kept. When
//! a single message moves both sizes, the pair is validated together and
//! written in whichever order keeps `core <= max` at every instant.

use crate::error::{AgentError, Result};
use crate::health::{components, HealthRegistry};
use crate::models::ConfigChangeMessage;
use crate::observability::{AgentMetrics, StructuredLogger};
use crate::pool::{PoolHandle, PoolRegistry};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

pub const KEEP_ALIVE_SECONDS: &str = "keepAliveSeconds";
pub const CORE_POOL_SIZE: &str = "corePoolSize";
pub const MAXIMUM_POOL_SIZE: &str = "maximumPoolSize";
pub const QUEUE_CAPACITY: &str = "queueCapacity";

/// Result of applying one change message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub pool_name: String,
    /// Fields written, in write order
    pub applied: Vec<&'static str>,
    /// Fields refused, with the reason; their previous values are kept
    pub rejected: Vec<(&'static str, AgentError)>,
}

impl ApplyOutcome {
    fn new(pool_name: &str) -> Self {
        Self {
            pool_name: pool_name.to_string(),
            applied: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// True when every requested field was written
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    fn result_label(&self) -> &'static str {
        match (self.applied.is_empty(), self.rejected.is_empty()) {
            (_, true) => "applied",
            (false, false) => "partial",
            (true, false) => "rejected",
        }
    }
}

/// Mutates registered pools in response to controller changes
pub struct ConfigApplier {
    registry: Arc<PoolRegistry>,
    metrics: AgentMetrics,
    logger: StructuredLogger,
}

impl ConfigApplier {
    pub fn new(registry: Arc<PoolRegistry>, logger: StructuredLogger) -> Self {
        Self {
            registry,
            metrics: AgentMetrics::new(),
            logger,
        }
    }

    /// Apply a change to the named pool.
    ///
    /// Fails only with `NotFound`; field-level problems are reported in the
    /// returned outcome.
    pub fn apply(&self, change: &ConfigChangeMessage) -> Result<ApplyOutcome> {
        let handle = match self.registry.get(&change.pool_name) {
            Ok(handle) => handle,
            Err(e) => {
                self.metrics.inc_config_change("not_found");
                self.logger
                    .log_config_rejected(&change.pool_name, "poolName", &e.to_string());
                return Err(e);
            }
        };

        let mut outcome = ApplyOutcome::new(handle.name());

        if let Some(secs) = change.keep_alive_seconds {
            handle.set_keep_alive_seconds(secs);
            outcome.applied.push(KEEP_ALIVE_SECONDS);
        }

        apply_pool_sizes(
            &handle,
            change.core_pool_size,
            change.maximum_pool_size,
            &mut outcome,
        );

        if let Some(capacity) = change.queue_capacity {
            match handle.queue().resize(capacity) {
                Ok(previous) => {
                    debug!(
                        pool = %handle.name(),
                        previous = previous,
                        capacity = capacity,
                        queued = handle.queue().len(),
                        "Queue resized"
                    );
                    outcome.applied.push(QUEUE_CAPACITY);
                }
                Err(e) => outcome.rejected.push((QUEUE_CAPACITY, e)),
            }
        }

        for (field, reason) in &outcome.rejected {
            self.logger
                .log_config_rejected(handle.name(), field, &reason.to_string());
        }
        if !outcome.applied.is_empty() {
            self.logger.log_config_applied(handle.name(), &outcome.applied);
        }
        self.metrics.inc_config_change(outcome.result_label());

        Ok(outcome)
    }
}

fn apply_pool_sizes(
    handle: &PoolHandle,
    core: Option<i64>,
    max: Option<i64>,
    outcome: &mut ApplyOutcome,
) {
    let core = core.and_then(|size| positive_size(CORE_POOL_SIZE, size, outcome));
    let max = max.and_then(|size| positive_size(MAXIMUM_POOL_SIZE, size, outcome));

    let current_core = handle.core_pool_size();
    let current_max = handle.maximum_pool_size();

    match (core, max) {
        (Some(core), Some(max)) if core <= max => {
            if max >= current_max {
                // Growing the ceiling: raise it before the floor follows
                handle.set_maximum_pool_size(max);
                handle.set_core_pool_size(core);
                outcome.applied.extend([MAXIMUM_POOL_SIZE, CORE_POOL_SIZE]);
            } else {
                handle.set_core_pool_size(core);
                handle.set_maximum_pool_size(max);
                outcome.applied.extend([CORE_POOL_SIZE, MAXIMUM_POOL_SIZE]);
            }
        }
        (Some(core), Some(max)) => {
            outcome.rejected.push((
                CORE_POOL_SIZE,
                AgentError::InvalidPoolSize {
                    field: CORE_POOL_SIZE,
                    requested: i64::from(core),
                    reason: format!("exceeds requested {} {}", MAXIMUM_POOL_SIZE, max),
                },
            ));
            apply_max(handle, max, current_core, outcome);
        }
        (Some(core), None) => {
            if core <= current_max {
                handle.set_core_pool_size(core);
                outcome.applied.push(CORE_POOL_SIZE);
            } else {
                outcome.rejected.push((
                    CORE_POOL_SIZE,
                    AgentError::InvalidPoolSize {
                        field: CORE_POOL_SIZE,
                        requested: i64::from(core),
                        reason: format!("exceeds {} {}", MAXIMUM_POOL_SIZE, current_max),
                    },
                ));
            }
        }
        (None, Some(max)) => apply_max(handle, max, current_core, outcome),
        (None, None) => {}
    }
}

fn apply_max(handle: &PoolHandle, max: u32, current_core: u32, outcome: &mut ApplyOutcome) {
    if max >= current_core {
        handle.set_maximum_pool_size(max);
        outcome.applied.push(MAXIMUM_POOL_SIZE);
    } else {
        outcome.rejected.push((
            MAXIMUM_POOL_SIZE,
            AgentError::InvalidPoolSize {
                field: MAXIMUM_POOL_SIZE,
                requested: i64::from(max),
                reason: format!("below {} {}", CORE_POOL_SIZE, current_core),
            },
        ));
    }
}

fn positive_size(field: &'static str, size: i64, outcome: &mut ApplyOutcome) -> Option<u32> {
    let reason = if size <= 0 {
        "must be greater than zero".to_string()
    } else {
        match u32::try_from(size) {
            Ok(size) => return Some(size),
            Err(_) => format!("exceeds {}", u32::MAX),
        }
    };
    outcome.rejected.push((
        field,
        AgentError::InvalidPoolSize {
            field,
            requested: size,
            reason,
        },
    ));
    None
}

/// Drains the watcher's change channel and applies messages in order
pub struct ApplierWorker {
    applier: Arc<ConfigApplier>,
    receiver: mpsc::Receiver<ConfigChangeMessage>,
    health: Option<HealthRegistry>,
}

impl ApplierWorker {
    pub fn new(applier: Arc<ConfigApplier>, receiver: mpsc::Receiver<ConfigChangeMessage>) -> Self {
        Self {
            applier,
            receiver,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Apply changes until the channel closes or shutdown is signalled.
    /// Messages already received when shutdown arrives are still applied.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting config applier");

        loop {
            tokio::select! {
                change = self.receiver.recv() => match change {
                    Some(change) => self.handle(change),
                    None => {
                        info!("Change channel closed, stopping config applier");
                        return;
                    }
                },
                _ = shutdown.recv() => {
                    while let Ok(change) = self.receiver.try_recv() {
                        self.handle(change);
                    }
                    info!("Shutting down config applier");
                    return;
                }
            }
        }
    }

    fn handle(&self, change: ConfigChangeMessage) {
        // NotFound is already logged by the applier; the change is dropped
        let result = self.applier.apply(&change);
        if let Some(health) = &self.health {
            match result {
                Ok(_) => health.record_success(components::APPLIER),
                Err(e) => health.record_failure(components::APPLIER, e.to_string()),
            }
        }
    }
}
