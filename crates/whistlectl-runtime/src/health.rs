//! Health checking for proxy instances.
//!
//! Polls the proxy's status endpoint on `127.0.0.1:<port>`. Connection
//! refused, request timeouts and non-2xx responses all mean "not ready yet".

use std::time::Duration;

use reqwest::Client;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info};
use whistlectl_core::{ControllerError, ControllerSettings, Result};

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// The endpoint answered with a 2xx status.
    Healthy,
    /// Anything else, with the reason for diagnostics.
    Unreachable { last_error: String },
}

impl HealthStatus {
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// HTTP status poller.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: Client,
    poll_interval: Duration,
    status_path: String,
}

impl HealthChecker {
    /// Create a checker.
    ///
    /// # Arguments
    ///
    /// * `poll_interval` - Delay between probes
    /// * `probe_timeout` - Timeout of each individual request
    /// * `status_path` - Path of the status endpoint, e.g. `/cgi-bin/server-info`
    pub fn new(poll_interval: Duration, probe_timeout: Duration, status_path: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(probe_timeout)
            .no_proxy()
            .build()
            .map_err(std::io::Error::other)?;

        let mut status_path = status_path.into();
        if !status_path.starts_with('/') {
            status_path.insert(0, '/');
        }

        Ok(Self {
            client,
            poll_interval,
            status_path,
        })
    }

    /// Build a checker from controller settings.
    ///
    /// This is the only constructor path; every client gets the per-probe
    /// timeout and ignores proxy environment variables.
    pub fn from_settings(settings: &ControllerSettings) -> Result<Self> {
        Self::new(
            settings.poll_interval,
            settings.probe_timeout,
            settings.status_path.clone(),
        )
    }

    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn status_path(&self) -> &str {
        &self.status_path
    }

    /// URL probed for `port`.
    pub fn status_url(&self, port: u16) -> String {
        format!("http://127.0.0.1:{port}{}", self.status_path)
    }

    /// Issue one probe.
    pub async fn check_once(&self, port: u16) -> HealthStatus {
        let url = self.status_url(port);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unreachable {
                last_error: format!("status {}", response.status()),
            },
            Err(e) => HealthStatus::Unreachable {
                last_error: describe_request_error(&e),
            },
        }
    }

    /// Poll until the status endpoint answers or `limit` elapses.
    ///
    /// A zero `limit` fails immediately without probing.
    pub async fn wait_until_ready(&self, port: u16, limit: Duration) -> Result<()> {
        let url = self.status_url(port);

        if limit.is_zero() {
            return Err(ControllerError::HealthCheckTimeout {
                url,
                timeout: limit,
                last_error: "health check timeout is zero; no probe attempted".to_string(),
            });
        }

        info!("Waiting for proxy to be ready at {}", url);

        let deadline = Instant::now() + limit;
        let mut attempt: u32 = 0;
        let mut last_error = String::from("no probe completed");

        loop {
            attempt += 1;

            match timeout_at(deadline, self.check_once(port)).await {
                Ok(HealthStatus::Healthy) => {
                    info!(port, attempt, "Proxy is ready");
                    return Ok(());
                }
                Ok(HealthStatus::Unreachable { last_error: e }) => {
                    debug!(port, attempt, "Health check failed: {}, retrying...", e);
                    last_error = e;
                }
                Err(_) => {
                    debug!(port, attempt, "Health check still pending at deadline");
                }
            }

            let next = (Instant::now() + self.poll_interval).min(deadline);
            sleep_until(next).await;

            if Instant::now() >= deadline {
                return Err(ControllerError::HealthCheckTimeout {
                    url,
                    timeout: limit,
                    last_error,
                });
            }
        }
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}
