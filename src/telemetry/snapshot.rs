//! # Telemetry Snapshot
//!
//! One decoded reading of the `/api/telemetry` endpoint.
//!
//! The feed is already decoded by the bridge; this module only defines the
//! JSON schema and a parser that rejects bodies which do not match it.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{MonitorError, Result};

/// Number of RC channels carried by the feed
pub const MAX_CHANNELS: usize = 16;

/// Nominal center of an RC channel in microseconds
pub const CHANNEL_CENTER_US: i32 = 1500;

/// GPS telemetry group
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gps {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: f64,
    /// Ground speed in km/h
    pub speed: f64,
}

/// Battery sensor telemetry group
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Battery {
    /// Battery voltage in volts
    pub voltage: f64,
    /// Current draw, in the unit reported by the feed
    pub current: f64,
    /// Capacity used in mAh
    pub capacity: f64,
    /// Battery remaining percentage (0-100%)
    pub remaining: i64,
}

/// Attitude telemetry group, all angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

/// A single fetched, timestamped telemetry reading
///
/// `fetched_at` is not part of the wire format. It is captured locally when
/// the body is decoded and is what every timing measurement is based on; the
/// feed's own `timestamp` is only a display label.
///
/// # Examples
///
/// ```
/// use fpv_telemetry_monitor::telemetry::snapshot::TelemetrySnapshot;
///
/// let body = br#"{
///     "linkUp": true, "activePort": "UART0", "timestamp": "12:00:00",
///     "channels": [1500, 1500, 1000, 1500],
///     "battery": {"voltage": 12.6, "current": 1.2, "capacity": 420.0, "remaining": 87},
///     "attitude": {"roll": 0.0, "pitch": 1.5, "yaw": 90.0},
///     "workMode": "joystick"
/// }"#;
///
/// let snapshot = TelemetrySnapshot::from_slice(body)?;
/// assert_eq!(snapshot.channels.len(), 4);
/// assert_eq!(snapshot.battery.remaining, 87);
/// # Ok::<(), fpv_telemetry_monitor::error::MonitorError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub link_up: bool,
    pub active_port: String,
    /// Wall-clock label supplied by the feed
    pub timestamp: String,
    pub channels: Vec<i32>,
    #[serde(default)]
    pub packets_received: u64,
    #[serde(default)]
    pub packets_sent: u64,
    #[serde(default)]
    pub packets_lost: u64,
    #[serde(default)]
    pub gps: Gps,
    pub battery: Battery,
    pub attitude: Attitude,
    pub work_mode: String,
    #[serde(default)]
    pub auto_mode: bool,
    #[serde(default)]
    pub auto_step: i64,
    #[serde(skip, default = "Instant::now")]
    pub fetched_at: Instant,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            link_up: true,
            active_port: String::new(),
            timestamp: String::new(),
            channels: vec![CHANNEL_CENTER_US; MAX_CHANNELS],
            packets_received: 0,
            packets_sent: 0,
            packets_lost: 0,
            gps: Gps::default(),
            battery: Battery::default(),
            attitude: Attitude::default(),
            work_mode: String::new(),
            auto_mode: false,
            auto_step: 0,
            fetched_at: Instant::now(),
        }
    }
}

impl TelemetrySnapshot {
    /// Decode a response body
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Protocol`] if the body is not valid JSON, is
    /// missing a required field, or carries more than [`MAX_CHANNELS`] channels.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let snapshot: TelemetrySnapshot = serde_json::from_slice(body)
            .map_err(|e| MonitorError::Protocol(format!("Malformed telemetry body: {}", e)))?;

        if snapshot.channels.len() > MAX_CHANNELS {
            return Err(MonitorError::Protocol(format!(
                "Telemetry body carries {} channels (max {})",
                snapshot.channels.len(),
                MAX_CHANNELS
            )));
        }

        Ok(snapshot)
    }

    /// Override the local fetch instant
    pub fn with_fetched_at(mut self, fetched_at: Instant) -> Self {
        self.fetched_at = fetched_at;
        self
    }
}
