//! Error taxonomy for the pool agent
//!
//! None of these errors is fatal to the agent. Each one degrades a single
//! reporting cycle or a single configuration change.

use thiserror::Error;

/// Errors raised by the agent core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// Network failure or non-success response from the controller
    #[error("controller transport error: {0}")]
    Transport(String),

    /// A configuration change named a pool that was never registered
    #[error("pool not found: {0}")]
    NotFound(String),

    /// Queue resize target is negative
    #[error("invalid queue capacity: {0}")]
    InvalidCapacity(i64),

    /// A pool size change would break `0 < core <= max`
    #[error("invalid pool size for {field}: requested {requested}, {reason}")]
    InvalidPoolSize {
        field: &'static str,
        requested: i64,
        reason: String,
    },

    /// Local hostname could not be determined
    #[error("could not resolve local hostname: {0}")]
    HostResolution(String),

    /// Controller returned a body that is not a valid change message
    #[error("could not decode controller payload: {0}")]
    Decode(String),
}

impl AgentError {
    /// Short, stable label used for metrics and structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Transport(_) => "transport",
            AgentError::NotFound(_) => "not_found",
            AgentError::InvalidCapacity(_) => "invalid_capacity",
            AgentError::InvalidPoolSize { .. } => "invalid_pool_size",
            AgentError::HostResolution(_) => "host_resolution",
            AgentError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
