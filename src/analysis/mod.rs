//! # Analysis Module
//!
//! Change detection and the statistics derived from it.
//!
//! This module handles:
//! - Comparing consecutive snapshots against per-field thresholds
//! - Accumulating the change log and computing interval/frequency statistics
//! - Measuring detection latency and grading it against configurable tiers

pub mod detector;
pub mod event;
pub mod frequency;
pub mod latency;

/// Serialize a `Duration` as fractional milliseconds
pub(crate) mod serde_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(d.as_nanos() as f64 / 1e6)
    }
}

/// Serialize an optional `Duration` as fractional milliseconds or null
pub(crate) mod serde_opt_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&(d.as_nanos() as f64 / 1e6)),
            None => serializer.serialize_none(),
        }
    }
}
