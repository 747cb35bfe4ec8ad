//! Configuration watch loop
//!
//! Keeps exactly one long-poll outstanding against the controller. A 304
//! is a heartbeat and the watch is re-issued at once; any change body is
//! decoded and published, in order, to the applier. Transport failures back
//! off exponentially and retry forever. Only shutdown ends the loop, and it
//! cancels the in-flight request.

mod applier;

pub use applier::{
    ApplierWorker, ApplyOutcome, ConfigApplier, CORE_POOL_SIZE, KEEP_ALIVE_SECONDS,
    MAXIMUM_POOL_SIZE, QUEUE_CAPACITY,
};

use crate::controller::{ControllerApi, WatchResponse};
use crate::health::{components, HealthRegistry};
use crate::models::{decode_changes, ConfigChangeMessage};
use crate::observability::AgentMetrics;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Whether a watch request is currently outstanding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchState {
    #[default]
    Idle,
    Watching,
}

/// Configuration for the watch loop
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// First delay after a failed exchange
    pub initial_backoff: Duration,
    /// Ceiling for the doubling backoff
    pub max_backoff: Duration,
    /// Capacity of the channel to the applier
    pub channel_buffer_size: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            channel_buffer_size: 64,
        }
    }
}

/// Statistics for the watch loop
#[derive(Debug, Default, Clone)]
pub struct WatcherStats {
    pub state: WatchState,
    pub polls: u64,
    pub not_modified: u64,
    pub changes_received: u64,
    pub decode_failures: u64,
    pub failures: u64,
    /// Delay applied after the most recent failure
    pub last_backoff: Duration,
    pub last_error: Option<String>,
}

/// Long-poll loop that feeds controller changes to the applier
pub struct ConfigWatcher {
    app_name: String,
    controller: Arc<dyn ControllerApi>,
    config: WatcherConfig,
    sender: mpsc::Sender<ConfigChangeMessage>,
    stats: Arc<RwLock<WatcherStats>>,
    metrics: AgentMetrics,
    health: Option<HealthRegistry>,
}

/// How a single watch exchange ended
enum Exchange {
    Continue,
    Failed,
    Stop,
}

impl ConfigWatcher {
    /// Create a watcher and the receiving end of its change channel
    pub fn new(
        app_name: impl Into<String>,
        controller: Arc<dyn ControllerApi>,
        config: WatcherConfig,
    ) -> (Self, mpsc::Receiver<ConfigChangeMessage>) {
        let (sender, receiver) = mpsc::channel(config.channel_buffer_size.max(1));
        let watcher = Self {
            app_name: app_name.into(),
            controller,
            config,
            sender,
            stats: Arc::new(RwLock::new(WatcherStats::default())),
            metrics: AgentMetrics::new(),
            health: None,
        };
        (watcher, receiver)
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Shared handle to the loop's statistics
    pub fn stats_handle(&self) -> Arc<RwLock<WatcherStats>> {
        Arc::clone(&self.stats)
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Run the watch loop until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(app = %self.app_name, "Starting config watcher");

        let mut backoff = self.config.initial_backoff;

        loop {
            self.stats.write().state = WatchState::Watching;

            let response = tokio::select! {
                response = self.controller.watch(&self.app_name) => response,
                _ = shutdown.recv() => break,
            };

            self.stats.write().state = WatchState::Idle;

            let exchange = match response {
                Ok(WatchResponse::NotModified) => {
                    self.record_poll("not_modified", |s| s.not_modified += 1);
                    Exchange::Continue
                }
                Ok(WatchResponse::Changed(body)) => {
                    self.record_poll("changed", |_| {});
                    self.publish(&body, &mut shutdown).await
                }
                Err(e) => {
                    self.metrics.inc_watch_poll("error");
                    warn!(
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Watch request failed, retrying"
                    );
                    {
                        let mut stats = self.stats.write();
                        stats.polls += 1;
                        stats.failures += 1;
                        stats.last_backoff = backoff;
                        stats.last_error = Some(e.to_string());
                    }
                    if let Some(health) = &self.health {
                        health.record_failure(components::WATCHER, e.to_string());
                    }
                    Exchange::Failed
                }
            };

            match exchange {
                Exchange::Continue => {
                    backoff = self.config.initial_backoff;
                    if let Some(health) = &self.health {
                        health.record_success(components::WATCHER);
                    }
                }
                Exchange::Failed => {
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.recv() => break,
                    }
                    backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
                }
                Exchange::Stop => break,
            }
        }

        self.stats.write().state = WatchState::Idle;
        info!(app = %self.app_name, "Config watcher stopped");
    }

    fn record_poll(&self, outcome: &str, update: impl FnOnce(&mut WatcherStats)) {
        self.metrics.inc_watch_poll(outcome);
        let mut stats = self.stats.write();
        stats.polls += 1;
        update(&mut stats);
    }

    /// Decode a change body and hand each message to the applier in order
    async fn publish(&self, body: &str, shutdown: &mut broadcast::Receiver<()>) -> Exchange {
        let decoded = match decode_changes(body) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, body_len = body.len(), "Ignoring undecodable change payload");
                self.stats.write().decode_failures += 1;
                return Exchange::Continue;
            }
        };

        if !decoded.skipped.is_empty() {
            for (index, e) in &decoded.skipped {
                warn!(index = *index, error = %e, "Ignoring undecodable change in batch");
            }
            self.stats.write().decode_failures += decoded.skipped.len() as u64;
        }

        for change in decoded.changes {
            debug!(pool = %change.pool_name, "Config change received");
            self.stats.write().changes_received += 1;

            tokio::select! {
                sent = self.sender.send(change) => {
                    if sent.is_err() {
                        warn!("Config applier is gone, stopping watcher");
                        return Exchange::Stop;
                    }
                }
                _ = shutdown.recv() => return Exchange::Stop,
            }
        }

        Exchange::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use crate::models::{InitReport, WorkerStateReport};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back scripted watch responses, then holds the poll open
    struct ScriptedController {
        script: Mutex<VecDeque<Result<WatchResponse>>>,
        calls: AtomicUsize,
    }

    impl ScriptedController {
        fn new(script: Vec<Result<WatchResponse>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ControllerApi for ScriptedController {
        async fn init(&self, _report: &InitReport) -> Result<String> {
            Ok("1".to_string())
        }

        async fn report_worker_state(&self, _report: &WorkerStateReport) -> Result<()> {
            Ok(())
        }

        async fn watch(&self, _app_name: &str) -> Result<WatchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                Some(response) => response,
                None => std::future::pending().await,
            }
        }
    }

    fn change_body() -> String {
        serde_json::to_string(&ConfigChangeMessage::for_pool("P1").maximum_pool_size(8)).unwrap()
    }

    async fn wait_for_calls(controller: &ScriptedController, calls: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.calls() < calls {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("watcher did not issue enough watch requests");
    }

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.max_backoff, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_heartbeats_then_single_change() {
        let controller = Arc::new(ScriptedController::new(vec![
            Ok(WatchResponse::NotModified),
            Ok(WatchResponse::NotModified),
            Ok(WatchResponse::Changed(change_body())),
            Ok(WatchResponse::NotModified),
        ]));
        let (watcher, mut rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        let stats = watcher.stats_handle();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        // Four scripted exchanges plus the fifth, still-pending watch
        wait_for_calls(&controller, 5).await;
        assert_eq!(stats.read().state, WatchState::Watching);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.pool_name, "P1");
        assert_eq!(change.maximum_pool_size, Some(8));
        assert!(rx.try_recv().is_err(), "exactly one change expected");

        {
            let stats = stats.read();
            assert_eq!(stats.not_modified, 3);
            assert_eq!(stats.changes_received, 1);
            assert_eq!(stats.failures, 0);
        }

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(stats.read().state, WatchState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_back_off_and_retry() {
        let controller = Arc::new(ScriptedController::new(vec![
            Err(AgentError::Transport("connection refused".to_string())),
            Err(AgentError::Transport("connection refused".to_string())),
            Err(AgentError::Transport("connection refused".to_string())),
            Ok(WatchResponse::Changed(change_body())),
        ]));
        let config = WatcherConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            channel_buffer_size: 4,
        };
        let health = HealthRegistry::new();
        let (watcher, mut rx) = ConfigWatcher::new("billing", controller.clone(), config);
        let watcher = watcher.with_health(health.clone());
        let stats = watcher.stats_handle();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.pool_name, "P1");

        {
            let stats = stats.read();
            assert_eq!(stats.failures, 3);
            // 100ms, then 200ms, then capped at 250ms
            assert_eq!(stats.last_backoff, Duration::from_millis(250));
        }

        wait_for_calls(&controller, 5).await;
        assert_eq!(
            health.status(components::WATCHER),
            Some(crate::health::ComponentStatus::Healthy)
        );

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_body_is_skipped() {
        let controller = Arc::new(ScriptedController::new(vec![
            Ok(WatchResponse::Changed("<html>oops</html>".to_string())),
            Ok(WatchResponse::Changed(change_body())),
        ]));
        let (watcher, mut rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        let stats = watcher.stats_handle();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.maximum_pool_size, Some(8));
        assert_eq!(stats.read().decode_failures, 1);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_body_published_in_order() {
        let body = r#"[{"poolName":"P1","corePoolSize":3},{"poolName":"P2","queueCapacity":5}]"#;
        let controller = Arc::new(ScriptedController::new(vec![Ok(WatchResponse::Changed(
            body.to_string(),
        ))]));
        let (watcher, mut rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        assert_eq!(rx.recv().await.unwrap().pool_name, "P1");
        assert_eq!(rx.recv().await.unwrap().pool_name, "P2");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_batch_element_does_not_drop_neighbours() {
        let body = r#"[
            {"poolName":"P1","maxPoolSize":8},
            {"poolName":"P2","keepAliveSeconds":-3},
            {"poolName":"P3","corePoolSize":-1,"keepAliveSeconds":30}
        ]"#;
        let controller = Arc::new(ScriptedController::new(vec![Ok(WatchResponse::Changed(
            body.to_string(),
        ))]));
        let (watcher, mut rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        let stats = watcher.stats_handle();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.pool_name, "P1");
        assert_eq!(first.maximum_pool_size, Some(8));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.pool_name, "P3");
        assert_eq!(second.core_pool_size, Some(-1));
        assert_eq!(second.keep_alive_seconds, Some(30));

        {
            let stats = stats.read();
            assert_eq!(stats.changes_received, 2);
            assert_eq!(stats.decode_failures, 1);
        }

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_watch() {
        let controller = Arc::new(ScriptedController::new(vec![]));
        let (watcher, _rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(watcher.run(shutdown_rx));

        wait_for_calls(&controller, 1).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("watcher did not stop")
            .unwrap();
        assert_eq!(controller.calls(), 1);
    }

    #[tokio::test]
    async fn test_stops_when_applier_is_gone() {
        let controller = Arc::new(ScriptedController::new(vec![Ok(WatchResponse::Changed(
            change_body(),
        ))]));
        let (watcher, rx) =
            ConfigWatcher::new("billing", controller.clone(), WatcherConfig::default());
        drop(rx);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(5), watcher.run(shutdown_rx))
            .await
            .expect("watcher should stop once its receiver is dropped");
    }
}
