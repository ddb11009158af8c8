//! # Frequency Analyzer
//!
//! Turns the global change log into interval and frequency statistics.
//!
//! All kinds share one timeline: the interval list is built from consecutive
//! entries of the log regardless of kind, so events detected in the same
//! comparison contribute zero-length intervals.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::event::{ChangeEvent, ChangeKind};
use super::serde_ms;

/// Statistics over the gaps between consecutive events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalStats {
    #[serde(rename = "mean_ms", with = "serde_ms")]
    pub mean: Duration,
    #[serde(rename = "median_ms", with = "serde_ms")]
    pub median: Duration,
    #[serde(rename = "min_ms", with = "serde_ms")]
    pub min: Duration,
    #[serde(rename = "max_ms", with = "serde_ms")]
    pub max: Duration,
    /// `1 / mean`, 0 when the mean interval is zero
    pub average_frequency_hz: f64,
    /// `1 / min`, 0 when the minimum interval is zero
    pub peak_frequency_hz: f64,
}

/// Per-kind event count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindShare {
    pub kind: ChangeKind,
    pub count: usize,
    /// Fraction of all events, 0.0-1.0
    pub share: f64,
}

/// Final statistics of a measurement run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyReport {
    pub total_events: usize,
    /// Elapsed time of the last event since run start
    #[serde(rename = "span_ms", with = "serde_ms")]
    pub span: Duration,
    /// `None` means insufficient data (fewer than two events)
    pub intervals: Option<IntervalStats>,
    pub kinds: Vec<KindShare>,
}

impl FrequencyReport {
    /// True when interval statistics could be computed
    pub fn is_sufficient(&self) -> bool {
        self.intervals.is_some()
    }
}

impl fmt::Display for FrequencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total changes: {}", self.total_events)?;
        writeln!(f, "Measurement span: {:.1} s", self.span.as_secs_f64())?;

        match &self.intervals {
            Some(stats) => {
                writeln!(f, "Mean interval: {:.1} ms", ms(stats.mean))?;
                writeln!(f, "Min interval: {:.1} ms", ms(stats.min))?;
                writeln!(f, "Max interval: {:.1} ms", ms(stats.max))?;
                writeln!(f, "Median interval: {:.1} ms", ms(stats.median))?;
                writeln!(f, "Average frequency: {:.1} Hz", stats.average_frequency_hz)?;
                writeln!(f, "Peak frequency: {:.1} Hz", stats.peak_frequency_hz)?;
            }
            None => writeln!(f, "Interval statistics: insufficient data")?,
        }

        if !self.kinds.is_empty() {
            writeln!(f, "Changes by kind:")?;
            for share in &self.kinds {
                writeln!(f, "  {}: {} ({:.1}%)", share.kind, share.count, share.share * 100.0)?;
            }
        }

        Ok(())
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn frequency_hz(interval: Duration) -> f64 {
    if interval.is_zero() {
        0.0
    } else {
        1.0 / interval.as_secs_f64()
    }
}

/// Append-only change log with batch statistics
///
/// # Examples
///
/// ```
/// use fpv_telemetry_monitor::analysis::frequency::FrequencyAnalyzer;
///
/// let analyzer = FrequencyAnalyzer::new();
/// let report = analyzer.report();
/// assert_eq!(report.total_events, 0);
/// assert!(!report.is_sufficient());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrequencyAnalyzer {
    log: Vec<ChangeEvent>,
}

impl FrequencyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append events in detection order
    pub fn record<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = ChangeEvent>,
    {
        self.log.extend(events);
    }

    /// Number of logged events
    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// The event log in detection order
    pub fn log(&self) -> &[ChangeEvent] {
        &self.log
    }

    /// Gaps between consecutive events
    pub fn intervals(&self) -> Vec<Duration> {
        self.log
            .windows(2)
            .map(|pair| pair[1].detected_at.saturating_duration_since(pair[0].detected_at))
            .collect()
    }

    /// Compute the statistics over everything logged so far
    pub fn report(&self) -> FrequencyReport {
        let mut counts: BTreeMap<ChangeKind, usize> = BTreeMap::new();
        for event in &self.log {
            *counts.entry(event.kind).or_default() += 1;
        }

        let total = self.log.len();
        let kinds = counts
            .into_iter()
            .map(|(kind, count)| KindShare {
                kind,
                count,
                share: count as f64 / total as f64,
            })
            .collect();

        FrequencyReport {
            total_events: total,
            span: self.log.last().map(|e| e.elapsed_since_start).unwrap_or_default(),
            intervals: interval_stats(self.intervals()),
            kinds,
        }
    }
}

fn interval_stats(mut intervals: Vec<Duration>) -> Option<IntervalStats> {
    if intervals.is_empty() {
        return None;
    }

    intervals.sort_unstable();
    let n = intervals.len();

    let total: Duration = intervals.iter().sum();
    let mean = Duration::from_nanos((total.as_nanos() / n as u128) as u64);

    let median = if n % 2 == 1 {
        intervals[n / 2]
    } else {
        (intervals[n / 2 - 1] + intervals[n / 2]) / 2
    };

    let min = intervals[0];
    let max = intervals[n - 1];

    Some(IntervalStats {
        mean,
        median,
        min,
        max,
        average_frequency_hz: frequency_hz(mean),
        peak_frequency_hz: frequency_hz(min),
    })
}
