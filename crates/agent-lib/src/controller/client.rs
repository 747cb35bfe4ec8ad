//! HTTP client for the controller API
//!
//! POSTs are bounded by a request timeout. The watch GET is not: the
//! controller decides how long to hold the long-poll open.

use super::{
    ControllerApi, WatchResponse, APP_NAME_PARAM, INIT_PATH, WATCH_PATH, WORKER_STATE_PATH,
};
use crate::error::{AgentError, Result};
use crate::models::{InitReport, WorkerStateReport};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the controller client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Controller base URL (e.g., "http://pool-controller:8080/ctl")
    pub endpoint: String,
    /// Connection timeout, applies to every request
    pub connect_timeout: Duration,
    /// Request timeout for init and worker-state posts
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://pool-controller:8080".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// `reqwest`-backed implementation of [`ControllerApi`]
pub struct HttpControllerClient {
    client: Client,
    config: ClientConfig,
    init_url: Url,
    worker_state_url: Url,
    watch_url: Url,
}

impl HttpControllerClient {
    /// Create a client for the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            init_url: endpoint_url(&config.endpoint, INIT_PATH)?,
            worker_state_url: endpoint_url(&config.endpoint, WORKER_STATE_PATH)?,
            watch_url: endpoint_url(&config.endpoint, WATCH_PATH)?,
            client,
            config,
        })
    }

    /// Get the controller base URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Get the request timeout applied to posts
    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    async fn post_json<B: Serialize + ?Sized>(&self, url: &Url, body: &B) -> Result<Response> {
        let response = self
            .client
            .post(url.clone())
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl ControllerApi for HttpControllerClient {
    async fn init(&self, report: &InitReport) -> Result<String> {
        let response = self.post_json(&self.init_url, report).await?;
        let version = response.text().await?;
        Ok(version.trim().to_string())
    }

    async fn report_worker_state(&self, report: &WorkerStateReport) -> Result<()> {
        let response = self.post_json(&self.worker_state_url, report).await?;
        debug!(status = %response.status(), "Worker state acknowledged");
        Ok(())
    }

    async fn watch(&self, app_name: &str) -> Result<WatchResponse> {
        let response = self
            .client
            .get(self.watch_url.clone())
            .query(&[(APP_NAME_PARAM, app_name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(WatchResponse::NotModified);
        }

        let response = ensure_success(response).await?;
        Ok(WatchResponse::Changed(response.text().await?))
    }
}

/// Join a controller path onto the base URL, keeping any base path prefix
fn endpoint_url(base: &str, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse(&joined)
        .map_err(|e| AgentError::Transport(format!("invalid controller URL {}: {}", joined, e)))
}

/// Turn a non-2xx response into a transport error carrying status and body
async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(AgentError::Transport(format!(
        "controller returned {}: {}",
        status, body
    )))
}

/// Builder for [`HttpControllerClient`]
pub struct ControllerClientBuilder {
    config: ClientConfig,
}

impl ControllerClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpControllerClient> {
        HttpControllerClient::new(self.config)
    }
}

impl Default for ControllerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
