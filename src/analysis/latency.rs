//! # Latency Tracker
//!
//! Measures detection latency: the time between the fetch that established
//! the stable baseline and the fetch in which a change was first observed.
//!
//! Only comparisons that produced events contribute. Grading against
//! [`LatencyTiers`] is kept apart from the measurement itself.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::detector::Detection;
use super::serde_opt_ms;

/// Qualitative grade of an average latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTier {
    Excellent,
    Good,
    NeedsImprovement,
}

impl fmt::Display for LatencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatencyTier::Excellent => f.write_str("excellent"),
            LatencyTier::Good => f.write_str("good"),
            LatencyTier::NeedsImprovement => f.write_str("needs improvement"),
        }
    }
}

/// Tier cut-points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyTiers {
    /// Below this: excellent
    pub excellent_below: Duration,
    /// Below this (and not excellent): good; otherwise needs improvement
    pub good_below: Duration,
}

impl Default for LatencyTiers {
    fn default() -> Self {
        Self {
            excellent_below: Duration::from_millis(50),
            good_below: Duration::from_millis(100),
        }
    }
}

impl LatencyTiers {
    /// Grade a latency
    pub fn classify(&self, latency: Duration) -> LatencyTier {
        if latency < self.excellent_below {
            LatencyTier::Excellent
        } else if latency < self.good_below {
            LatencyTier::Good
        } else {
            LatencyTier::NeedsImprovement
        }
    }
}

/// Running latency figures
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    #[serde(rename = "average_ms", with = "serde_opt_ms")]
    pub average: Option<Duration>,
    #[serde(rename = "min_ms", with = "serde_opt_ms")]
    pub min: Option<Duration>,
    #[serde(rename = "max_ms", with = "serde_opt_ms")]
    pub max: Option<Duration>,
    #[serde(rename = "last_ms", with = "serde_opt_ms")]
    pub last: Option<Duration>,
    pub tier: Option<LatencyTier>,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.average, self.tier) {
            (Some(average), Some(tier)) => write!(
                f,
                "average detection latency {:.1} ms over {} measurements ({})",
                average.as_secs_f64() * 1000.0,
                self.count,
                tier
            ),
            _ => f.write_str("no detection latency measured"),
        }
    }
}

/// Accumulates per-detection latencies
#[derive(Debug, Clone)]
pub struct LatencyTracker {
    tiers: LatencyTiers,
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Option<Duration>,
    last: Option<Duration>,
}

impl LatencyTracker {
    pub fn new(tiers: LatencyTiers) -> Self {
        Self {
            tiers,
            count: 0,
            total: Duration::ZERO,
            min: None,
            max: None,
            last: None,
        }
    }

    /// Record the latency of a detection, if it has one
    ///
    /// Returns the recorded latency. Baselines and empty detections are skipped.
    pub fn observe(&mut self, detection: &Detection) -> Option<Duration> {
        let latency = detection.latency()?;
        self.record(latency);
        Some(latency)
    }

    /// Record one latency measurement
    pub fn record(&mut self, latency: Duration) {
        self.count += 1;
        self.total += latency;
        self.min = Some(self.min.map_or(latency, |m| m.min(latency)));
        self.max = Some(self.max.map_or(latency, |m| m.max(latency)));
        self.last = Some(latency);
    }

    /// Number of measurements
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Running average, `None` before the first measurement
    pub fn average(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        Some(Duration::from_nanos((self.total.as_nanos() / self.count as u128) as u64))
    }

    /// Tier of the running average
    pub fn tier(&self) -> Option<LatencyTier> {
        self.average().map(|avg| self.tiers.classify(avg))
    }

    pub fn summary(&self) -> LatencySummary {
        LatencySummary {
            count: self.count,
            average: self.average(),
            min: self.min,
            max: self.max,
            last: self.last,
            tier: self.tier(),
        }
    }
}
