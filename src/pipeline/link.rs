//! Link status derived from fetch outcomes.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::error::MonitorError;
use crate::telemetry::snapshot::TelemetrySnapshot;

/// Reachability of the telemetry source as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    /// Nothing fetched yet
    #[default]
    Unknown,
    Up,
    /// Last fetch failed; stays down until the next success
    Down,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStatus::Unknown => f.write_str("unknown"),
            LinkStatus::Up => f.write_str("up"),
            LinkStatus::Down => f.write_str("down"),
        }
    }
}

/// Link state plus failure bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkSummary {
    pub status: LinkStatus,
    pub consecutive_failures: u64,
    pub total_failures: u64,
    /// `linkUp` as reported by the last snapshot
    pub feed_link_up: Option<bool>,
}

/// Tracks link up/down from the stream of poll outcomes
#[derive(Debug, Default)]
pub struct LinkMonitor {
    summary: LinkSummary,
}

impl LinkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> LinkStatus {
        self.summary.status
    }

    pub fn summary(&self) -> LinkSummary {
        self.summary
    }

    /// Record a successful fetch, returning the new status on a transition
    pub fn on_snapshot(&mut self, snapshot: &TelemetrySnapshot) -> Option<LinkStatus> {
        let recovered_after = self.summary.consecutive_failures;
        self.summary.consecutive_failures = 0;

        if self.summary.feed_link_up != Some(snapshot.link_up) {
            if !snapshot.link_up {
                warn!("Source reports its radio link down (port {})", snapshot.active_port);
            } else if self.summary.feed_link_up.is_some() {
                info!("Source reports its radio link up again");
            }
            self.summary.feed_link_up = Some(snapshot.link_up);
        }

        if self.summary.status == LinkStatus::Up {
            return None;
        }
        if self.summary.status == LinkStatus::Down {
            info!("Telemetry source reachable again after {} failed fetches", recovered_after);
        }
        self.summary.status = LinkStatus::Up;
        Some(LinkStatus::Up)
    }

    /// Record a failed fetch, returning the new status on a transition
    pub fn on_failure(&mut self, error: &MonitorError) -> Option<LinkStatus> {
        self.summary.consecutive_failures += 1;
        self.summary.total_failures += 1;

        if self.summary.status == LinkStatus::Down {
            return None;
        }
        warn!("Telemetry source unreachable: {}", error);
        self.summary.status = LinkStatus::Down;
        Some(LinkStatus::Down)
    }
}
