//! Change events produced by the detector.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Which tracked field crossed its threshold
///
/// Variant order is the fixed evaluation order of the detector, so sorting
/// by kind reproduces detection order within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeKind {
    AttitudeRoll,
    AttitudePitch,
    AttitudeYaw,
    BatteryVoltage,
    BatteryCurrent,
    BatteryRemaining,
    WorkMode,
    /// Zero-based channel index
    Channel(usize),
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::AttitudeRoll => f.write_str("ATTITUDE_ROLL"),
            ChangeKind::AttitudePitch => f.write_str("ATTITUDE_PITCH"),
            ChangeKind::AttitudeYaw => f.write_str("ATTITUDE_YAW"),
            ChangeKind::BatteryVoltage => f.write_str("BATTERY_VOLTAGE"),
            ChangeKind::BatteryCurrent => f.write_str("BATTERY_CURRENT"),
            ChangeKind::BatteryRemaining => f.write_str("BATTERY_REMAINING"),
            ChangeKind::WorkMode => f.write_str("WORK_MODE"),
            // Channels are numbered from 1 for display, as on the transmitter
            ChangeKind::Channel(index) => write!(f, "CHANNEL_{}", index + 1),
        }
    }
}

impl Serialize for ChangeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Value of a tracked field on either side of a change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{:.2}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}

impl FieldValue {
    /// Numeric view, `None` for text values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Text(_) => None,
        }
    }
}

/// A field-level transition that exceeded its threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub old_value: FieldValue,
    pub new_value: FieldValue,
    /// Shared by every event produced from the same comparison
    pub detected_at: Instant,
    pub elapsed_since_start: Duration,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6.1}s] {}: {} -> {}",
            self.elapsed_since_start.as_secs_f64(),
            self.kind,
            self.old_value,
            self.new_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ChangeKind::AttitudeRoll.to_string(), "ATTITUDE_ROLL");
        assert_eq!(ChangeKind::BatteryVoltage.to_string(), "BATTERY_VOLTAGE");
        assert_eq!(ChangeKind::Channel(0).to_string(), "CHANNEL_1");
        assert_eq!(ChangeKind::Channel(15).to_string(), "CHANNEL_16");
    }

    #[test]
    fn test_kind_order_matches_detection_order() {
        let mut kinds = vec![
            ChangeKind::Channel(1),
            ChangeKind::WorkMode,
            ChangeKind::Channel(0),
            ChangeKind::AttitudeYaw,
            ChangeKind::AttitudeRoll,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::AttitudeRoll,
                ChangeKind::AttitudeYaw,
                ChangeKind::WorkMode,
                ChangeKind::Channel(0),
                ChangeKind::Channel(1),
            ]
        );
    }

    #[test]
    fn test_field_value_serialization() {
        assert_eq!(serde_json::to_string(&FieldValue::Float(12.5)).unwrap(), "12.5");
        assert_eq!(serde_json::to_string(&FieldValue::Integer(80)).unwrap(), "80");
        assert_eq!(serde_json::to_string(&FieldValue::Text("auto".into())).unwrap(), "\"auto\"");
        assert_eq!(serde_json::to_string(&ChangeKind::Channel(2)).unwrap(), "\"CHANNEL_3\"");
    }

    #[test]
    fn test_event_display() {
        let event = ChangeEvent {
            kind: ChangeKind::BatteryVoltage,
            old_value: FieldValue::Float(12.6),
            new_value: FieldValue::Float(12.5),
            detected_at: Instant::now(),
            elapsed_since_start: Duration::from_millis(1500),
        };
        assert_eq!(event.to_string(), "[   1.5s] BATTERY_VOLTAGE: 12.60 -> 12.50");
    }
}
