//! # Change Detector
//!
//! Decides which tracked fields crossed their noise threshold between the
//! reference snapshot and a freshly fetched one.
//!
//! ## Evaluation Order
//!
//! | # | Field | Rule |
//! |---|-------|------|
//! | 1 | attitude.roll | `|Δ| > roll` |
//! | 2 | attitude.pitch | `|Δ| > pitch` |
//! | 3 | attitude.yaw | `|Δ| > yaw` |
//! | 4 | battery.voltage | `|Δ| > voltage` |
//! | 5 | battery.current | `|Δ| > current` |
//! | 6 | battery.remaining | `!=` |
//! | 7 | workMode | `!=` |
//! | 8.. | channels[0..4] or [0..16] | `|Δ| > channel` |
//!
//! All events of one comparison carry the fetch instant of the current
//! snapshot, so the order of the log is fully determined by the order in
//! which snapshots are processed.
//!
//! ## Reference Handling
//!
//! The reference only moves forward when a comparison produced at least one
//! event. Slow drift below the threshold therefore accumulates against a
//! stable baseline instead of being lost sample by sample.

use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

use super::event::{ChangeEvent, ChangeKind, FieldValue};
use crate::telemetry::snapshot::{TelemetrySnapshot, MAX_CHANNELS};

/// Number of channels compared in [`ChannelScope::Primary`] (roll, pitch, throttle, yaw)
pub const PRIMARY_CHANNELS: usize = 4;

/// Which RC channels are compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelScope {
    /// First four stick channels
    #[default]
    Primary,
    /// All sixteen channels
    All,
}

impl ChannelScope {
    /// Number of leading channels in scope
    pub fn channel_count(self) -> usize {
        match self {
            ChannelScope::Primary => PRIMARY_CHANNELS,
            ChannelScope::All => MAX_CHANNELS,
        }
    }
}

/// Minimum absolute difference per field for a transition to count as a change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Degrees
    pub roll: f64,
    /// Degrees
    pub pitch: f64,
    /// Degrees
    pub yaw: f64,
    /// Volts
    pub voltage: f64,
    /// Feed unit
    pub current: f64,
    /// Microseconds
    pub channel: i32,
    pub channel_scope: ChannelScope,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            roll: 0.1,
            pitch: 0.1,
            yaw: 0.1,
            voltage: 0.01,
            current: 1.0,
            channel: 5,
            channel_scope: ChannelScope::Primary,
        }
    }
}

/// Result of one detector invocation
#[derive(Debug, Clone)]
pub struct Detection {
    /// Events in fixed field order, possibly empty
    pub events: Vec<ChangeEvent>,
    /// Snapshot to compare the next fetch against
    pub reference: TelemetrySnapshot,
    /// Fetch instant of the baseline the comparison ran against
    pub baseline_at: Option<Instant>,
    /// Fetch instant of the snapshot that was just compared
    pub observed_at: Instant,
}

impl Detection {
    /// True if at least one field crossed its threshold
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty()
    }

    /// Time from the baseline fetch to the fetch where the change was first seen
    ///
    /// `None` for baselines and for comparisons without changes.
    pub fn latency(&self) -> Option<Duration> {
        if !self.has_changes() {
            return None;
        }
        self.baseline_at
            .map(|baseline| self.observed_at.saturating_duration_since(baseline))
    }
}

/// Stateless comparator over a threshold table
///
/// The caller owns the reference snapshot and threads it through every call.
///
/// # Examples
///
/// ```
/// use fpv_telemetry_monitor::analysis::detector::{ChangeDetector, Thresholds};
/// use fpv_telemetry_monitor::telemetry::snapshot::TelemetrySnapshot;
/// use tokio::time::Instant;
///
/// let detector = ChangeDetector::new(Thresholds::default(), Instant::now());
///
/// let baseline = detector.detect(None, TelemetrySnapshot::default());
/// assert!(baseline.events.is_empty());
///
/// let mut tilted = TelemetrySnapshot::default();
/// tilted.attitude.roll = 5.0;
/// let detection = detector.detect(Some(baseline.reference), tilted);
/// assert_eq!(detection.events.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    thresholds: Thresholds,
    run_started: Instant,
}

impl ChangeDetector {
    /// Create a detector; `run_started` anchors `elapsed_since_start` of every event
    pub fn new(thresholds: Thresholds, run_started: Instant) -> Self {
        Self { thresholds, run_started }
    }

    /// Threshold table in use
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Compare `current` against `previous` and pick the next reference
    ///
    /// With no previous snapshot, `current` becomes the baseline and no events
    /// are produced.
    pub fn detect(&self, previous: Option<TelemetrySnapshot>, current: TelemetrySnapshot) -> Detection {
        let observed_at = current.fetched_at;

        let Some(previous) = previous else {
            return Detection {
                events: Vec::new(),
                reference: current,
                baseline_at: None,
                observed_at,
            };
        };

        let events = self.compare(&previous, &current);
        let baseline_at = Some(previous.fetched_at);
        let reference = if events.is_empty() { previous } else { current };

        Detection {
            events,
            reference,
            baseline_at,
            observed_at,
        }
    }

    /// Field-by-field comparison in fixed order
    pub fn compare(&self, previous: &TelemetrySnapshot, current: &TelemetrySnapshot) -> Vec<ChangeEvent> {
        let t = &self.thresholds;
        let detected_at = current.fetched_at;
        let elapsed_since_start = detected_at.saturating_duration_since(self.run_started);
        let mut events = Vec::new();

        let mut push = |kind: ChangeKind, old_value: FieldValue, new_value: FieldValue| {
            events.push(ChangeEvent {
                kind,
                old_value,
                new_value,
                detected_at,
                elapsed_since_start,
            });
        };

        for (kind, old, new, threshold) in [
            (ChangeKind::AttitudeRoll, previous.attitude.roll, current.attitude.roll, t.roll),
            (ChangeKind::AttitudePitch, previous.attitude.pitch, current.attitude.pitch, t.pitch),
            (ChangeKind::AttitudeYaw, previous.attitude.yaw, current.attitude.yaw, t.yaw),
            (ChangeKind::BatteryVoltage, previous.battery.voltage, current.battery.voltage, t.voltage),
            (ChangeKind::BatteryCurrent, previous.battery.current, current.battery.current, t.current),
        ] {
            if (new - old).abs() > threshold {
                push(kind, FieldValue::Float(old), FieldValue::Float(new));
            }
        }

        if previous.battery.remaining != current.battery.remaining {
            push(
                ChangeKind::BatteryRemaining,
                FieldValue::Integer(previous.battery.remaining),
                FieldValue::Integer(current.battery.remaining),
            );
        }

        if previous.work_mode != current.work_mode {
            push(
                ChangeKind::WorkMode,
                FieldValue::Text(previous.work_mode.clone()),
                FieldValue::Text(current.work_mode.clone()),
            );
        }

        // Only the overlapping prefix is comparable when channel counts differ
        let channels = previous
            .channels
            .iter()
            .zip(current.channels.iter())
            .take(t.channel_scope.channel_count())
            .enumerate();
        for (index, (&old, &new)) in channels {
            // Widened so extreme raw values cannot overflow
            if (i64::from(new) - i64::from(old)).abs() > i64::from(t.channel) {
                push(
                    ChangeKind::Channel(index),
                    FieldValue::Integer(old as i64),
                    FieldValue::Integer(new as i64),
                );
            }
        }

        events
    }
}
