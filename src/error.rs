//! # Error Types
//!
//! Custom error types for the telemetry monitor using `thiserror`.

use thiserror::Error;

/// Main error type for the telemetry monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Transport-level failure (connection refused, reset, DNS)
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Request exceeded its per-request timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-OK status or a body that does not match the snapshot schema
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors while exporting
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error category used by the pipeline to decide between "skip this tick" and "abort"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Protocol,
    Configuration,
    Io,
}

impl MonitorError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Connectivity(_) | MonitorError::Timeout(_) => ErrorKind::Connectivity,
            MonitorError::Protocol(_) => ErrorKind::Protocol,
            MonitorError::Config(_) => ErrorKind::Configuration,
            MonitorError::Io(_) | MonitorError::Json(_) => ErrorKind::Io,
        }
    }

    /// Steady-state faults that only cost one tick of data
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connectivity | ErrorKind::Protocol)
    }

    /// Build a configuration error from a validation message
    pub fn config(msg: impl std::fmt::Display) -> Self {
        use serde::de::Error as _;
        MonitorError::Config(toml::de::Error::custom(msg))
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MonitorError::Timeout(err.to_string())
        } else if err.is_decode() || err.is_body() {
            MonitorError::Protocol(err.to_string())
        } else if let Some(status) = err.status() {
            MonitorError::Protocol(format!("HTTP status {}", status))
        } else {
            MonitorError::Connectivity(err.to_string())
        }
    }
}

/// Result type alias for the telemetry monitor
pub type Result<T> = std::result::Result<T, MonitorError>;
