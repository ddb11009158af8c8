//! Trait seam for fetching telemetry snapshots, plus the HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

use super::snapshot::TelemetrySnapshot;
use crate::error::{MonitorError, Result};

/// Path of the snapshot endpoint relative to the base URL
pub const TELEMETRY_PATH: &str = "/api/telemetry";

/// Anything that can produce one telemetry snapshot per call
///
/// Every failure is reported as an error value; the poller turns it into a
/// failure marker and keeps going.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch one snapshot
    async fn fetch(&self) -> Result<TelemetrySnapshot>;
}

/// Polls `GET {base_url}/api/telemetry`
#[derive(Debug, Clone)]
pub struct HttpTelemetrySource {
    client: Client,
    url: String,
}

impl HttpTelemetrySource {
    /// Create a source for the given base URL
    ///
    /// # Arguments
    ///
    /// * `base_url` - Bridge base URL (e.g., "http://localhost:8081")
    /// * `timeout` - Per-request timeout, expected to be below the poll interval
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), TELEMETRY_PATH),
        })
    }

    /// Full snapshot URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch(&self) -> Result<TelemetrySnapshot> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(MonitorError::Protocol(format!("HTTP status {}", status)));
        }

        let body = response.bytes().await?;
        let fetched_at = Instant::now();
        trace!("Fetched telemetry body ({} bytes)", body.len());

        Ok(TelemetrySnapshot::from_slice(&body)?.with_fetched_at(fetched_at))
    }
}
