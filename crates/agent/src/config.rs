//! Agent configuration

use anyhow::{bail, Context, Result};
use pool_agent_lib::pool::{PoolHandle, PoolRegistry};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming the optional config file
const CONFIG_FILE_ENV: &str = "AGENT_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "pool-agent";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Application name reported to the controller
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Port the host application serves on
    #[serde(default = "default_app_port")]
    pub app_port: u16,

    /// Controller base URL
    #[serde(default = "default_controller_url")]
    pub controller_url: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Worker state reporting interval in seconds
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Maximum jitter added to each report interval
    #[serde(default = "default_report_jitter")]
    pub report_jitter_ms: u64,

    #[serde(default = "default_watch_initial_backoff")]
    pub watch_initial_backoff_ms: u64,

    #[serde(default = "default_watch_max_backoff")]
    pub watch_max_backoff_secs: u64,

    /// Timeout for init and worker-state posts
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pools registered at startup
    #[serde(default)]
    pub pools: Vec<PoolSpec>,
}

/// Static definition of one managed pool
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub core_pool_size: u32,
    pub maximum_pool_size: u32,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// `0` for unbounded
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default)]
    pub thread_name_prefix: Option<String>,
}

fn default_app_name() -> String {
    std::env::var("APP_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_app_port() -> u16 {
    8080
}

fn default_controller_url() -> String {
    "http://pool-controller:8080".to_string()
}

fn default_api_port() -> u16 {
    9464
}

fn default_report_interval() -> u64 {
    5
}

fn default_report_jitter() -> u64 {
    500
}

fn default_watch_initial_backoff() -> u64 {
    1000
}

fn default_watch_max_backoff() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

fn default_keep_alive() -> u64 {
    60
}

impl AgentConfig {
    /// Load configuration from an optional file and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&file).required(false))
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", file))?;

        let config: AgentConfig = config
            .try_deserialize()
            .context("invalid agent configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Reject pool definitions a [`PoolHandle`] would refuse
    pub fn validate(&self) -> Result<()> {
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than zero");
        }

        let mut seen = std::collections::HashSet::new();
        for pool in &self.pools {
            if !seen.insert(pool.name.as_str()) {
                bail!("pool {} is defined more than once", pool.name);
            }
            if pool.core_pool_size == 0 {
                bail!("pool {}: core_pool_size must be greater than zero", pool.name);
            }
            if pool.core_pool_size > pool.maximum_pool_size {
                bail!(
                    "pool {}: core_pool_size {} exceeds maximum_pool_size {}",
                    pool.name,
                    pool.core_pool_size,
                    pool.maximum_pool_size
                );
            }
        }

        Ok(())
    }

    /// Build a registry holding every configured pool
    pub fn build_registry(&self) -> Result<PoolRegistry> {
        let registry = PoolRegistry::new();
        for spec in &self.pools {
            let mut builder = PoolHandle::builder(&spec.name)
                .core_pool_size(spec.core_pool_size)
                .maximum_pool_size(spec.maximum_pool_size)
                .keep_alive_seconds(spec.keep_alive_seconds)
                .queue_capacity(spec.queue_capacity);
            if let Some(prefix) = &spec.thread_name_prefix {
                builder = builder.thread_name_prefix(prefix);
            }

            let handle = builder
                .build()
                .with_context(|| format!("failed to create pool {}", spec.name))?;
            registry.register(handle);
        }
        Ok(registry)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn report_jitter(&self) -> Duration {
        Duration::from_millis(self.report_jitter_ms)
    }

    pub fn watch_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.watch_initial_backoff_ms)
    }

    pub fn watch_max_backoff(&self) -> Duration {
        Duration::from_secs(self.watch_max_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
