//! Health tracking for the agent's long-running tasks
//!
//! The reporter, watcher and applier record each cycle's outcome here. A
//! component that keeps failing is degraded, never fatal: the agent stays
//! live and keeps retrying, so only an explicit `set_unhealthy` fails the
//! health probe.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Recent cycles failed; the component keeps retrying
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const REPORTER: &str = "reporter";
    pub const WATCHER: &str = "watcher";
    pub const APPLIER: &str = "applier";
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    ready: bool,
}

/// Shared health registry; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub fn register(&self, name: &str) {
        self.state
            .write()
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a successful cycle, clearing any failure streak
    pub fn record_success(&self, name: &str) {
        self.state
            .write()
            .components
            .insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Record a failed cycle; the component becomes degraded
    pub fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write();
        let entry = state
            .components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy);

        entry.consecutive_failures += 1;
        if entry.status != ComponentStatus::Unhealthy {
            entry.status = ComponentStatus::Degraded;
        }
        entry.message = Some(message.into());
        entry.last_check_timestamp = chrono::Utc::now().timestamp();
    }

    /// Mark a component as failed outright (e.g. its task exited)
    pub fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        let mut state = self.state.write();
        let entry = state
            .components
            .entry(name.to_string())
            .or_insert_with(ComponentHealth::healthy);

        entry.status = ComponentStatus::Unhealthy;
        entry.message = Some(message.into());
        entry.last_check_timestamp = chrono::Utc::now().timestamp();
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.write().ready = ready;
    }

    /// Current status of a single component
    pub fn status(&self, name: &str) -> Option<ComponentStatus> {
        self.state.read().components.get(name).map(|h| h.status)
    }

    pub fn health(&self) -> HealthResponse {
        let components = self.state.read().components.clone();
        let status = components
            .values()
            .map(|h| h.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse { status, components }
    }

    pub fn readiness(&self) -> ReadinessResponse {
        let ready = self.state.read().ready;
        if !ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Agent not yet initialized".to_string()),
            };
        }

        if self.health().status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Component unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health();

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().ready);
    }

    #[test]
    fn test_failure_degrades_then_success_recovers() {
        let registry = HealthRegistry::new();
        registry.register(components::WATCHER);
        registry.register(components::REPORTER);

        registry.record_failure(components::WATCHER, "connection refused");
        registry.record_failure(components::WATCHER, "connection refused");

        let health = registry.health();
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(health.components[components::WATCHER].consecutive_failures, 2);

        registry.record_success(components::WATCHER);
        assert_eq!(registry.status(components::WATCHER), Some(ComponentStatus::Healthy));
        assert_eq!(registry.health().status, ComponentStatus::Healthy);
    }

    #[test]
    fn test_degraded_is_still_ready() {
        let registry = HealthRegistry::new();
        registry.register(components::REPORTER);
        registry.set_ready(true);
        registry.record_failure(components::REPORTER, "timeout");

        assert!(registry.readiness().ready);
    }

    #[test]
    fn test_unhealthy_is_not_ready() {
        let registry = HealthRegistry::new();
        registry.register(components::APPLIER);
        registry.set_ready(true);
        registry.set_unhealthy(components::APPLIER, "worker exited");

        assert_eq!(registry.health().status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().ready);
    }
}
