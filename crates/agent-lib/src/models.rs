//! Wire models exchanged with the controller
//!
//! Field names follow the controller's camelCase JSON contract.

use serde::{Deserialize, Serialize};

/// Static configuration of one managed pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfigInfo {
    pub pool_name: String,
    pub core_pool_size: u32,
    pub maximum_pool_size: u32,
    pub keep_alive_seconds: u64,
    pub thread_name_prefix: String,
    pub queue_type: String,
    /// `0` means the queue is unbounded
    pub queue_capacity: usize,
}

/// Static configuration plus live metrics captured at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolWorkState {
    #[serde(flatten)]
    pub config: PoolConfigInfo,
    pub active_count: usize,
    pub queue_remaining_capacity: usize,
    pub completed_task_count: u64,
    pub largest_pool_size: usize,
    pub task_count: u64,
    pub pool_size: usize,
    pub queue_size: usize,
    /// Unix timestamp (milliseconds) of the capture
    pub captured_at: i64,
}

/// One-time bootstrap registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub app_name: String,
    pub thread_pool_config_list: Vec<PoolConfigInfo>,
}

/// Periodic telemetry payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStateReport {
    pub app_name: String,
    pub app_port: u16,
    /// Local hostname, absent when it could not be resolved
    pub instant_name: Option<String>,
    pub thread_pool_config_list: Vec<PoolWorkState>,
}

/// Identity of the application hosting the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub app_name: String,
    pub app_port: u16,
}

impl AppIdentity {
    pub fn new(app_name: impl Into<String>, app_port: u16) -> Self {
        Self {
            app_name: app_name.into(),
            app_port,
        }
    }
}

/// Configuration change pushed by the controller for a single pool.
///
/// Absent fields are left untouched when the change is applied. Sizes are
/// signed so an out-of-range value is rejected for its own field instead of
/// failing the whole message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeMessage {
    pub pool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_pool_size: Option<i64>,
    #[serde(default, alias = "maxPoolSize", skip_serializing_if = "Option::is_none")]
    pub maximum_pool_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<i64>,
}

impl ConfigChangeMessage {
    pub fn for_pool(pool_name: impl Into<String>) -> Self {
        Self {
            pool_name: pool_name.into(),
            ..Default::default()
        }
    }

    pub fn core_pool_size(mut self, size: i64) -> Self {
        self.core_pool_size = Some(size);
        self
    }

    pub fn maximum_pool_size(mut self, size: i64) -> Self {
        self.maximum_pool_size = Some(size);
        self
    }

    pub fn keep_alive_seconds(mut self, secs: u64) -> Self {
        self.keep_alive_seconds = Some(secs);
        self
    }

    pub fn queue_capacity(mut self, capacity: i64) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// True when the message carries no field to change
    pub fn is_empty(&self) -> bool {
        self.core_pool_size.is_none()
            && self.maximum_pool_size.is_none()
            && self.keep_alive_seconds.is_none()
            && self.queue_capacity.is_none()
    }
}

/// Change messages decoded from one watch response body
#[derive(Debug, Default)]
pub struct DecodedChanges {
    /// Well-formed messages, in body order
    pub changes: Vec<ConfigChangeMessage>,
    /// Elements that did not decode, with their position in the batch
    pub skipped: Vec<(usize, serde_json::Error)>,
}

/// Decode a watch response body into change messages, preserving order.
///
/// The body is either a single change or an array of them. Array elements
/// decode independently: a malformed element is skipped and reported in
/// [`DecodedChanges::skipped`] while its neighbours are kept. Fails only
/// when the body is not JSON or a lone object is not a change.
pub fn decode_changes(body: &str) -> serde_json::Result<DecodedChanges> {
    let mut decoded = DecodedChanges::default();

    match serde_json::from_str::<serde_json::Value>(body)? {
        serde_json::Value::Array(elements) => {
            for (index, element) in elements.into_iter().enumerate() {
                match serde_json::from_value(element) {
                    Ok(change) => decoded.changes.push(change),
                    Err(e) => decoded.skipped.push((index, e)),
                }
            }
        }
        single => decoded.changes.push(serde_json::from_value(single)?),
    }

    Ok(decoded)
}
