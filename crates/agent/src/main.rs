//! Pool Agent - dynamic thread-pool control-plane agent
//!
//! Runs next to the host application, reporting the state of its managed
//! pools to the controller and applying configuration changes pushed back
//! over a long-poll watch.

use anyhow::Result;
use pool_agent_lib::{
    controller::{ControllerApi, ControllerClientBuilder},
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    reporter::{ReportLoopBuilder, StateReporter},
    watcher::{ApplierWorker, ConfigApplier, ConfigWatcher, WatcherConfig},
    AppIdentity,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pool-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        app_name = %config.app_name,
        controller = %config.controller_url,
        pools = config.pools.len(),
        "Agent configured"
    );

    let registry = Arc::new(config.build_registry()?);

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::REPORTER);
    health_registry.register(components::WATCHER);
    health_registry.register(components::APPLIER);

    // Initialize metrics
    let metrics = AgentMetrics::new();
    metrics.set_pools_registered(registry.len() as i64);

    // Initialize structured logger
    let logger = StructuredLogger::new(&config.app_name);
    logger.log_startup(AGENT_VERSION, registry.len());

    let controller: Arc<dyn ControllerApi> = Arc::new(
        ControllerClientBuilder::new()
            .endpoint(&config.controller_url)
            .request_timeout(config.request_timeout())
            .build()?,
    );

    let reporter = Arc::new(
        StateReporter::new(
            AppIdentity::new(&config.app_name, config.app_port),
            Arc::clone(&registry),
            Arc::clone(&controller),
        )
        .with_health(health_registry.clone()),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Bootstrap registration, off the startup path
    let init_reporter = Arc::clone(&reporter);
    tokio::spawn(async move {
        init_reporter.initial_report().await;
    });

    let report_loop = ReportLoopBuilder::new()
        .reporter(Arc::clone(&reporter))
        .interval(config.report_interval())
        .jitter(config.report_jitter())
        .build()?;
    let report_handle = tokio::spawn(report_loop.run(shutdown_tx.subscribe()));

    let watcher_config = WatcherConfig {
        initial_backoff: config.watch_initial_backoff(),
        max_backoff: config.watch_max_backoff(),
        ..WatcherConfig::default()
    };
    let (watcher, changes) =
        ConfigWatcher::new(&config.app_name, Arc::clone(&controller), watcher_config);
    let watcher = watcher.with_health(health_registry.clone());
    let watcher_handle = tokio::spawn(watcher.run(shutdown_tx.subscribe()));

    let applier = Arc::new(ConfigApplier::new(Arc::clone(&registry), logger.clone()));
    let applier_handle = tokio::spawn(
        ApplierWorker::new(applier, changes)
            .with_health(health_registry.clone())
            .run(shutdown_tx.subscribe()),
    );

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        Arc::clone(&registry),
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true);

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false);

    // Receivers may already be gone if a task exited early
    let _ = shutdown_tx.send(());

    for (name, handle) in [
        (components::REPORTER, report_handle),
        (components::WATCHER, watcher_handle),
        (components::APPLIER, applier_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(component = name, error = %e, "Task ended abnormally");
        }
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
