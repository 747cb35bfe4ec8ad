//! Periodic reporting loop
//!
//! Drives [`StateReporter::timing_report`] on a fixed interval with jitter
//! until shutdown is signalled.

use super::StateReporter;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Configuration for the reporting loop
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Base reporting interval (default: 5 seconds)
    pub interval: Duration,
    /// Maximum jitter added to each interval (default: 500 ms)
    pub jitter: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            jitter: Duration::from_millis(500),
        }
    }
}

/// Timer that invokes the reporter's periodic push
pub struct ReportLoop {
    reporter: Arc<StateReporter>,
    config: ReportConfig,
}

impl ReportLoop {
    pub fn new(reporter: Arc<StateReporter>, config: ReportConfig) -> Self {
        Self { reporter, config }
    }

    /// Run until a shutdown signal arrives. The first report is sent
    /// after one interval.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting pool state reporting loop"
        );

        let mut ticks = 0u64;
        let mut failures = 0u64;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.next_delay()) => {
                    ticks += 1;
                    if !self.reporter.timing_report().await {
                        failures += 1;
                    }

                    // Every 12 ticks, one minute at the default interval
                    if ticks % 12 == 0 {
                        debug!(ticks = ticks, failures = failures, "Reporting loop status");
                    }
                }
                _ = shutdown.recv() => {
                    info!(ticks = ticks, "Shutting down pool state reporting loop");
                    break;
                }
            }
        }
    }

    fn next_delay(&self) -> Duration {
        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        self.config.interval + Duration::from_millis(jitter_ms)
    }
}

/// Pseudo-random jitter in `0..max_ms` derived from the clock
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as u64;

    now % max_ms
}

/// Builder for the reporting loop
pub struct ReportLoopBuilder {
    reporter: Option<Arc<StateReporter>>,
    config: ReportConfig,
}

impl ReportLoopBuilder {
    pub fn new() -> Self {
        Self {
            reporter: None,
            config: ReportConfig::default(),
        }
    }

    pub fn reporter(mut self, reporter: Arc<StateReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<ReportLoop> {
        let reporter = self
            .reporter
            .ok_or_else(|| anyhow::anyhow!("Reporter is required"))?;
        if self.config.interval.is_zero() {
            anyhow::bail!("Report interval must be greater than zero");
        }

        Ok(ReportLoop::new(reporter, self.config))
    }
}

impl Default for ReportLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
