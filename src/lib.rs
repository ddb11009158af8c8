//! # FPV Telemetry Monitor Library
//!
//! Measure how fast and how often an FPV telemetry feed actually changes.
//!
//! This library polls the bridge's HTTP snapshot endpoint at a fixed cadence,
//! detects threshold-exceeding field transitions between snapshots, and turns
//! them into interval, frequency and detection-latency statistics.

pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod sink;
pub mod telemetry;
