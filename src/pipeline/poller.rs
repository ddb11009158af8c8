//! # Poller
//!
//! Fetches one snapshot per tick and hands the outcome to the consumer.
//!
//! ## Timing
//!
//! Each fetch is bounded by the per-request timeout, which configuration
//! keeps strictly below the poll interval, so a slow source can delay at most
//! the tick it belongs to. Missed ticks are skipped rather than bursted to
//! keep the cadence fixed.
//!
//! ## Shutdown
//!
//! The run state is only checked between fetches: a stop request lets the
//! in-flight fetch finish (or time out) and its outcome is still queued.
//! Dropping the sender at the end closes the queue, which is how the
//! consumer learns the producer is done.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::state::RunState;
use crate::error::MonitorError;
use crate::telemetry::snapshot::TelemetrySnapshot;
use crate::telemetry::source::TelemetrySource;

/// Cadence and per-request bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// A tick that produced no snapshot
#[derive(Debug)]
pub struct FetchFailure {
    /// When the failed fetch was issued
    pub requested_at: Instant,
    pub error: MonitorError,
}

/// What one tick produced
#[derive(Debug)]
pub enum PollOutcome {
    Snapshot(TelemetrySnapshot),
    Failure(FetchFailure),
}

impl PollOutcome {
    pub fn is_snapshot(&self) -> bool {
        matches!(self, PollOutcome::Snapshot(_))
    }
}

/// Producer-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    pub snapshots: u64,
    pub failures: u64,
    /// Ticks lost while waiting on a full queue
    pub skipped_ticks: u64,
}

/// Scheduled snapshot producer
pub struct Poller {
    source: Arc<dyn TelemetrySource>,
    settings: PollerSettings,
}

impl Poller {
    pub fn new(source: Arc<dyn TelemetrySource>, settings: PollerSettings) -> Self {
        Self { source, settings }
    }

    /// Issue a single bounded fetch
    pub async fn poll_once(&self) -> PollOutcome {
        let requested_at = Instant::now();

        match timeout(self.settings.timeout, self.source.fetch()).await {
            Ok(Ok(snapshot)) => PollOutcome::Snapshot(snapshot),
            Ok(Err(error)) => PollOutcome::Failure(FetchFailure { requested_at, error }),
            Err(_) => PollOutcome::Failure(FetchFailure {
                requested_at,
                error: MonitorError::Timeout(format!(
                    "no response within {} ms",
                    self.settings.timeout.as_millis()
                )),
            }),
        }
    }

    /// Poll until the run leaves `Running` or the consumer goes away
    pub async fn run(self, tx: mpsc::Sender<PollOutcome>, mut state: watch::Receiver<RunState>) -> PollerStats {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = PollerStats::default();
        info!(
            "Polling every {} ms (timeout {} ms)",
            self.settings.interval.as_millis(),
            self.settings.timeout.as_millis()
        );

        loop {
            if *state.borrow_and_update() != RunState::Running {
                break;
            }

            tokio::select! {
                biased;

                changed = state.changed() => {
                    if changed.is_err() {
                        // Controller dropped; nobody can stop us any more
                        break;
                    }
                    continue;
                }

                _ = ticker.tick() => {}
            }

            let outcome = self.poll_once().await;
            stats.ticks += 1;
            match &outcome {
                PollOutcome::Snapshot(_) => stats.snapshots += 1,
                PollOutcome::Failure(_) => stats.failures += 1,
            }

            let outcome = match tx.try_send(outcome) {
                Ok(()) => continue,
                Err(TrySendError::Full(outcome)) => outcome,
                Err(TrySendError::Closed(_)) => {
                    warn!("Consumer dropped the queue, stopping poller");
                    break;
                }
            };

            // Queue full: the ticker skips whatever passes while we wait
            let blocked_at = Instant::now();
            if tx.send(outcome).await.is_err() {
                warn!("Consumer dropped the queue, stopping poller");
                break;
            }
            let waited = blocked_at.elapsed();
            let skipped = (waited.as_nanos() / self.settings.interval.as_nanos()) as u64;
            if skipped > 0 {
                stats.skipped_ticks += skipped;
                debug!(
                    "Queue full for {} ms, skipped {} ticks ({} total)",
                    waited.as_millis(),
                    skipped,
                    stats.skipped_ticks
                );
            }
        }

        info!(
            "Poller stopped after {} ticks ({} snapshots, {} failures, {} skipped)",
            stats.ticks, stats.snapshots, stats.failures, stats.skipped_ticks
        );
        stats
    }
}
