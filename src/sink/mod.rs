//! # Event Sink
//!
//! Presentation boundary of a run. The session pushes change events, link
//! transitions, latency samples and statistics into an [`EventSink`] and never
//! formats output itself.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::event::ChangeEvent;
use crate::analysis::latency::LatencyTier;
use crate::pipeline::link::LinkStatus;
use crate::pipeline::poller::FetchFailure;
use crate::pipeline::session::{RunReport, StatsUpdate};
use crate::telemetry::snapshot::TelemetrySnapshot;

/// Receiver of everything a run observes
///
/// Only change events are mandatory; the rest default to no-ops.
pub trait EventSink: Send {
    /// A field crossed its threshold
    fn on_change(&mut self, event: &ChangeEvent);

    /// A snapshot was received
    fn on_snapshot(&mut self, _snapshot: &TelemetrySnapshot) {}

    /// A tick produced no snapshot
    fn on_failure(&mut self, _failure: &FetchFailure) {}

    /// The source became reachable or unreachable
    fn on_link(&mut self, _status: LinkStatus) {}

    /// A detection latency was measured
    fn on_latency(&mut self, _latency: Duration, _tier: LatencyTier) {}

    /// Periodic progress
    fn on_stats(&mut self, _stats: &StatsUpdate) {}

    /// The run finished
    fn on_report(&mut self, _report: &RunReport) {}
}

/// Writes everything to the `tracing` subscriber
#[derive(Debug, Default)]
pub struct TracingSink {
    show_snapshots: bool,
}

impl TracingSink {
    /// Create a sink; `show_snapshots` logs a line for every received snapshot
    pub fn new(show_snapshots: bool) -> Self {
        Self { show_snapshots }
    }
}

impl EventSink for TracingSink {
    fn on_change(&mut self, event: &ChangeEvent) {
        info!("{}", event);
    }

    fn on_snapshot(&mut self, snapshot: &TelemetrySnapshot) {
        if !self.show_snapshots {
            return;
        }
        let channels: Vec<String> = snapshot.channels.iter().take(4).map(|c| c.to_string()).collect();
        info!(
            "{} roll {:.1} pitch {:.1} yaw {:.1} | {:.2} V {:.1} A {}% | ch {} | {} link {}",
            snapshot.timestamp,
            snapshot.attitude.roll,
            snapshot.attitude.pitch,
            snapshot.attitude.yaw,
            snapshot.battery.voltage,
            snapshot.battery.current,
            snapshot.battery.remaining,
            channels.join(","),
            snapshot.work_mode,
            if snapshot.link_up { "up" } else { "down" }
        );
    }

    fn on_link(&mut self, status: LinkStatus) {
        match status {
            LinkStatus::Down => warn!("Link {}", status),
            _ => info!("Link {}", status),
        }
    }

    fn on_latency(&mut self, latency: Duration, tier: LatencyTier) {
        debug!("Detection latency {:.1} ms ({})", latency.as_secs_f64() * 1000.0, tier);
    }

    fn on_stats(&mut self, stats: &StatsUpdate) {
        info!("{}", stats);
    }

    fn on_report(&mut self, report: &RunReport) {
        info!("=== Run report ===");
        for line in report.to_string().lines() {
            info!("{}", line);
        }
    }
}

/// Keeps everything in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct MemorySink {
    pub changes: Vec<ChangeEvent>,
    pub snapshots: usize,
    /// Issue instants of failed fetches
    pub failures: Vec<Instant>,
    pub links: Vec<LinkStatus>,
    pub latencies: Vec<(Duration, LatencyTier)>,
    pub stats: Vec<StatsUpdate>,
    pub reports: Vec<RunReport>,
}

impl EventSink for MemorySink {
    fn on_change(&mut self, event: &ChangeEvent) {
        self.changes.push(event.clone());
    }

    fn on_snapshot(&mut self, _snapshot: &TelemetrySnapshot) {
        self.snapshots += 1;
    }

    fn on_failure(&mut self, failure: &FetchFailure) {
        self.failures.push(failure.requested_at);
    }

    fn on_link(&mut self, status: LinkStatus) {
        self.links.push(status);
    }

    fn on_latency(&mut self, latency: Duration, tier: LatencyTier) {
        self.latencies.push((latency, tier));
    }

    fn on_stats(&mut self, stats: &StatsUpdate) {
        self.stats.push(stats.clone());
    }

    fn on_report(&mut self, report: &RunReport) {
        self.reports.push(report.clone());
    }
}
