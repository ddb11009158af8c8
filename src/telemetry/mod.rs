//! # Telemetry Module
//!
//! Access to the bridge's HTTP API.
//!
//! This module handles:
//! - The snapshot data model served by `/api/telemetry`
//! - Fetching snapshots behind the [`source::TelemetrySource`] trait
//! - Sending fire-and-forget commands to `/api/command`

pub mod command;
pub mod snapshot;
pub mod source;

#[cfg(test)]
pub(crate) mod stub_server;
