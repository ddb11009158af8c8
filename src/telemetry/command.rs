//! # Command Client
//!
//! Fire-and-forget control of the bridge via `GET /api/command?cmd=<name>&value=<v>`.
//!
//! Commands mutate remote state (work mode, channel overrides) and are not
//! part of the measurement pipeline.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::{MonitorError, Result};

/// Path of the command endpoint relative to the base URL
pub const COMMAND_PATH: &str = "/api/command";

/// Acknowledgement returned by the bridge
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandAck {
    pub status: String,
    pub command: String,
    pub value: String,
}

impl CommandAck {
    /// True when the bridge reported `"status": "ok"`
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Sends control commands to the bridge
#[derive(Debug, Clone)]
pub struct CommandClient {
    client: Client,
    url: String,
}

impl CommandClient {
    /// Create a client for the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), COMMAND_PATH),
        })
    }

    /// Send an arbitrary command
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the bridge cannot be reached, or a
    /// protocol error on a non-OK status or an unparseable acknowledgement.
    pub async fn send(&self, cmd: &str, value: &str) -> Result<CommandAck> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("cmd", cmd), ("value", value)])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(MonitorError::Protocol(format!(
                "Command '{}' rejected with HTTP status {}",
                cmd,
                response.status()
            )));
        }

        let ack: CommandAck = response
            .json()
            .await
            .map_err(|e| MonitorError::Protocol(format!("Malformed command acknowledgement: {}", e)))?;

        info!("Command {}={} acknowledged ({})", ack.command, ack.value, ack.status);
        Ok(ack)
    }

    /// Switch the bridge work mode (e.g., "joystick", "manual", "auto")
    pub async fn set_mode(&self, mode: &str) -> Result<CommandAck> {
        self.send("setMode", mode).await
    }

    /// Override one RC channel
    ///
    /// # Arguments
    ///
    /// * `channel` - 1-based channel number (1-16)
    /// * `value` - Channel value in microseconds
    pub async fn set_channel(&self, channel: usize, value: u16) -> Result<CommandAck> {
        if !(1..=crate::telemetry::snapshot::MAX_CHANNELS).contains(&channel) {
            return Err(MonitorError::config(format!("channel {} is out of bounds (must be 1-16)", channel)));
        }
        self.send("setChannel", &format!("{}={}", channel, value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::stub_server::{spawn_stub_server, StubResponse};

    #[tokio::test]
    async fn test_set_mode_sends_query_and_parses_ack() {
        let server = spawn_stub_server(|_| {
            StubResponse::json(200, r#"{"status":"ok","command":"setMode","value":"manual"}"#.to_string())
        })
        .await;

        let client = CommandClient::new(&server.base_url, Duration::from_secs(2)).unwrap();
        let ack = client.set_mode("manual").await.unwrap();

        assert!(ack.is_ok());
        assert_eq!(ack.command, "setMode");
        assert_eq!(ack.value, "manual");
        assert_eq!(server.requests()[0], "GET /api/command?cmd=setMode&value=manual HTTP/1.1");
    }

    #[tokio::test]
    async fn test_set_channel_encodes_value() {
        let server = spawn_stub_server(|_| {
            StubResponse::json(200, r#"{"status":"ok","command":"setChannel","value":"1=1500"}"#.to_string())
        })
        .await;

        let client = CommandClient::new(&server.base_url, Duration::from_secs(2)).unwrap();
        let ack = client.set_channel(1, 1500).await.unwrap();

        assert_eq!(ack.value, "1=1500");
        assert_eq!(server.requests()[0], "GET /api/command?cmd=setChannel&value=1%3D1500 HTTP/1.1");
    }

    #[tokio::test]
    async fn test_set_channel_out_of_range() {
        let client = CommandClient::new("http://localhost:8081", Duration::from_secs(2)).unwrap();
        assert!(client.set_channel(0, 1500).await.is_err());
        assert!(client.set_channel(17, 1500).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_command() {
        let server = spawn_stub_server(|_| StubResponse::json(404, "{}".to_string())).await;

        let client = CommandClient::new(&server.base_url, Duration::from_secs(2)).unwrap();
        let err = client.send("setMode", "auto").await.unwrap_err();
        assert!(matches!(err, MonitorError::Protocol(_)));
    }
}
