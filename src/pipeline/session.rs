//! # Measurement Session
//!
//! Wires one [`Poller`] to one consumer through a bounded queue and runs until
//! the time limit expires or the controller is asked to stop.
//!
//! The consumer owns everything stateful: the reference snapshot, the event
//! log, the latency tracker and the link monitor. Nothing but the queue is
//! shared with the producer.
//!
//! ## Shutdown Order
//!
//! 1. The controller leaves `Running` (deadline or external stop)
//! 2. The poller finishes its in-flight fetch, queues it and drops the sender
//! 3. The consumer keeps receiving until the queue reports closed
//! 4. The producer task is joined and the run moves to `Stopped`
//! 5. The final report goes to the sink

use serde::Serialize;
use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::link::{LinkMonitor, LinkStatus, LinkSummary};
use super::poller::{PollOutcome, Poller, PollerSettings, PollerStats};
use super::state::{RunController, RunState};
use crate::analysis::detector::{ChangeDetector, Detection, Thresholds};
use crate::analysis::event::ChangeEvent;
use crate::analysis::frequency::{FrequencyAnalyzer, FrequencyReport};
use crate::analysis::latency::{LatencySummary, LatencyTier, LatencyTiers, LatencyTracker};
use crate::analysis::{serde_ms, serde_opt_ms};
use crate::config::Config;
use crate::sink::EventSink;
use crate::telemetry::snapshot::TelemetrySnapshot;
use crate::telemetry::source::TelemetrySource;

/// How long a run lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Stop by itself after this much time
    For(Duration),
    /// Run until the controller is stopped
    UntilStopped,
}

/// Everything a session needs besides the source
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poller: PollerSettings,
    pub thresholds: Thresholds,
    pub tiers: LatencyTiers,
    pub queue_capacity: usize,
    pub stats_interval: Duration,
    pub limit: RunLimit,
}

impl SessionSettings {
    /// Live display cadence, unbounded unless `monitor.duration_s` is set
    pub fn monitor(config: &Config) -> Self {
        Self {
            poller: PollerSettings {
                interval: Duration::from_millis(config.monitor.interval_ms),
                timeout: Duration::from_millis(config.monitor.timeout_ms),
            },
            limit: config
                .monitor
                .duration_s
                .map_or(RunLimit::UntilStopped, |secs| RunLimit::For(Duration::from_secs(secs))),
            ..Self::common(config)
        }
    }

    /// Frequency analysis cadence, bounded by `analysis.duration_s`
    pub fn analysis(config: &Config) -> Self {
        Self {
            poller: PollerSettings {
                interval: Duration::from_millis(config.analysis.interval_ms),
                timeout: Duration::from_millis(config.analysis.timeout_ms),
            },
            limit: RunLimit::For(Duration::from_secs(config.analysis.duration_s)),
            ..Self::common(config)
        }
    }

    fn common(config: &Config) -> Self {
        Self {
            poller: PollerSettings {
                interval: Duration::from_millis(config.monitor.interval_ms),
                timeout: Duration::from_millis(config.monitor.timeout_ms),
            },
            thresholds: config.thresholds.to_thresholds(),
            tiers: config.latency.to_tiers(),
            queue_capacity: config.pipeline.queue_capacity,
            stats_interval: Duration::from_millis(config.monitor.stats_interval_ms),
            limit: RunLimit::UntilStopped,
        }
    }
}

/// Periodic progress figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsUpdate {
    #[serde(rename = "elapsed_ms", with = "serde_ms")]
    pub elapsed: Duration,
    pub snapshots: u64,
    pub failures: u64,
    pub events: usize,
    pub link: LinkStatus,
    #[serde(rename = "latency_average_ms", with = "serde_opt_ms")]
    pub latency_average: Option<Duration>,
    pub latency_tier: Option<LatencyTier>,
}

impl fmt::Display for StatsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6.1}s] {} snapshots, {} failures, {} changes, link {}",
            self.elapsed.as_secs_f64(),
            self.snapshots,
            self.failures,
            self.events,
            self.link
        )?;
        if let (Some(average), Some(tier)) = (self.latency_average, self.latency_tier) {
            write!(f, ", latency {:.1} ms ({})", average.as_secs_f64() * 1000.0, tier)?;
        }
        Ok(())
    }
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub frequency: FrequencyReport,
    pub latency: LatencySummary,
    /// Fetches issued by the poller
    pub fetches: u64,
    /// Snapshots processed by the consumer
    pub snapshots: u64,
    /// Failure markers processed by the consumer
    pub failures: u64,
    #[serde(rename = "duration_ms", with = "serde_ms")]
    pub duration: Duration,
    /// Successful snapshots per second of run
    pub fetch_rate_hz: f64,
    pub link: LinkSummary,
    /// Full change log, exported separately
    #[serde(skip)]
    pub log: Vec<ChangeEvent>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run duration: {:.1} s", self.duration.as_secs_f64())?;
        writeln!(
            f,
            "Snapshots: {} ({} failures, {:.1} snapshots/s)",
            self.snapshots, self.failures, self.fetch_rate_hz
        )?;
        write!(f, "{}", self.frequency)?;
        writeln!(f, "Latency: {}", self.latency)?;
        write!(f, "Link: {}", self.link.status)
    }
}

/// One measurement run
pub struct Session {
    source: Arc<dyn TelemetrySource>,
    settings: SessionSettings,
    controller: RunController,
}

impl Session {
    pub fn new(source: Arc<dyn TelemetrySource>, settings: SessionSettings) -> Self {
        Self {
            source,
            settings,
            controller: RunController::new(),
        }
    }

    /// Handle for stopping the run from elsewhere (e.g. Ctrl+C)
    pub fn controller(&self) -> RunController {
        self.controller.clone()
    }

    /// Run to completion, reporting to `sink` as data arrives
    pub async fn run(self, sink: &mut dyn EventSink) -> RunReport {
        let settings = self.settings;
        let run_started = Instant::now();

        if !self.controller.start() {
            info!("Run was stopped before it started");
        }

        let (tx, mut rx) = mpsc::channel(settings.queue_capacity);
        let poller = Poller::new(self.source, settings.poller);
        let producer = tokio::spawn(poller.run(tx, self.controller.subscribe()));

        let limit = settings.limit;
        let deadline = async move {
            match limit {
                RunLimit::For(limit) => match run_started.checked_add(limit) {
                    Some(deadline) => sleep_until(deadline).await,
                    // Beyond the clock's range: never reached
                    None => pending::<()>().await,
                },
                RunLimit::UntilStopped => pending::<()>().await,
            }
        };
        tokio::pin!(deadline);
        let mut deadline_passed = false;

        let mut stats_ticker = interval_at(run_started + settings.stats_interval, settings.stats_interval);
        stats_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut consumer = Consumer::new(&settings, run_started);

        loop {
            tokio::select! {
                outcome = rx.recv() => match outcome {
                    Some(outcome) => consumer.handle(outcome, sink),
                    // Sender dropped: the poller is done and the queue is drained
                    None => break,
                },

                _ = &mut deadline, if !deadline_passed => {
                    deadline_passed = true;
                    info!("Run time limit reached, stopping");
                    self.controller.stop();
                }

                _ = stats_ticker.tick() => {
                    sink.on_stats(&consumer.stats(run_started.elapsed()));
                }
            }
        }

        let poller_stats = match producer.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Poller task failed: {}", e);
                PollerStats::default()
            }
        };

        if self.controller.state() == RunState::Running {
            self.controller.stop();
        }
        self.controller.finish();

        let report = consumer.into_report(poller_stats, run_started.elapsed());
        info!(
            "Run finished: {} snapshots, {} failures, {} changes",
            report.snapshots, report.failures, report.frequency.total_events
        );
        sink.on_report(&report);
        report
    }
}

/// Consumer-side state, never shared with the poller
struct Consumer {
    run_started: Instant,
    detector: ChangeDetector,
    tiers: LatencyTiers,
    reference: Option<TelemetrySnapshot>,
    analyzer: FrequencyAnalyzer,
    latency: LatencyTracker,
    link: LinkMonitor,
    snapshots: u64,
    failures: u64,
}

impl Consumer {
    fn new(settings: &SessionSettings, run_started: Instant) -> Self {
        Self {
            run_started,
            detector: ChangeDetector::new(settings.thresholds, run_started),
            tiers: settings.tiers,
            reference: None,
            analyzer: FrequencyAnalyzer::new(),
            latency: LatencyTracker::new(settings.tiers),
            link: LinkMonitor::new(),
            snapshots: 0,
            failures: 0,
        }
    }

    fn handle(&mut self, outcome: PollOutcome, sink: &mut dyn EventSink) {
        match outcome {
            PollOutcome::Snapshot(snapshot) => {
                self.snapshots += 1;
                if let Some(status) = self.link.on_snapshot(&snapshot) {
                    sink.on_link(status);
                }
                sink.on_snapshot(&snapshot);

                let detection = self.detector.detect(self.reference.take(), snapshot);
                if let Some(latency) = self.latency.observe(&detection) {
                    sink.on_latency(latency, self.tiers.classify(latency));
                }

                let Detection { events, reference, .. } = detection;
                for event in &events {
                    sink.on_change(event);
                }
                if !events.is_empty() {
                    debug!("{} changes in snapshot {}", events.len(), self.snapshots);
                }
                self.analyzer.record(events);
                self.reference = Some(reference);
            }
            PollOutcome::Failure(failure) => {
                self.failures += 1;
                debug!(
                    "Fetch issued at +{:.1} ms failed: {}",
                    failure.requested_at.saturating_duration_since(self.run_started).as_secs_f64() * 1000.0,
                    failure.error
                );
                sink.on_failure(&failure);
                if let Some(status) = self.link.on_failure(&failure.error) {
                    sink.on_link(status);
                }
            }
        }
    }

    fn stats(&self, elapsed: Duration) -> StatsUpdate {
        StatsUpdate {
            elapsed,
            snapshots: self.snapshots,
            failures: self.failures,
            events: self.analyzer.len(),
            link: self.link.status(),
            latency_average: self.latency.average(),
            latency_tier: self.latency.tier(),
        }
    }

    fn into_report(self, poller: PollerStats, duration: Duration) -> RunReport {
        let seconds = duration.as_secs_f64();
        let fetch_rate_hz = if seconds > 0.0 {
            self.snapshots as f64 / seconds
        } else {
            0.0
        };

        RunReport {
            frequency: self.analyzer.report(),
            latency: self.latency.summary(),
            fetches: poller.ticks,
            snapshots: self.snapshots,
            failures: self.failures,
            duration,
            fetch_rate_hz,
            link: self.link.summary(),
            log: self.analyzer.log().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::event::{ChangeKind, FieldValue};
    use crate::error::MonitorError;
    use crate::sink::MemorySink;
    use crate::telemetry::source::mocks::ScriptedSource;
    use crate::telemetry::source::MockTelemetrySource;

    fn settings(interval_ms: u64, limit: RunLimit) -> SessionSettings {
        SessionSettings {
            poller: PollerSettings {
                interval: Duration::from_millis(interval_ms),
                timeout: Duration::from_millis(interval_ms / 2),
            },
            thresholds: Thresholds::default(),
            tiers: LatencyTiers::default(),
            queue_capacity: 8,
            stats_interval: Duration::from_secs(1),
            limit,
        }
    }

    fn snapshot(roll: f64, voltage: f64) -> TelemetrySnapshot {
        let mut s = TelemetrySnapshot::default();
        s.attitude.roll = roll;
        s.battery.voltage = voltage;
        s.work_mode = "joystick".to_string();
        s
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_roll_then_voltage() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(0.0, 12.60)),
            Ok(snapshot(0.05, 12.60)),
            Ok(snapshot(0.20, 12.60)),
            Ok(snapshot(0.20, 12.50)),
        ]);
        let session = Session::new(Arc::new(source), settings(10, RunLimit::For(Duration::from_millis(35))));

        let mut sink = MemorySink::default();
        let report = session.run(&mut sink).await;

        assert_eq!(report.snapshots, 4);
        assert_eq!(report.failures, 0);

        let kinds: Vec<ChangeKind> = report.log.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::AttitudeRoll, ChangeKind::BatteryVoltage]);
        assert_eq!(report.log[0].old_value, FieldValue::Float(0.0));
        assert_eq!(report.log[0].new_value, FieldValue::Float(0.20));
        assert_eq!(report.log[1].old_value, FieldValue::Float(12.60));
        assert_eq!(report.log[1].new_value, FieldValue::Float(12.50));

        // S2 fetched at 20 ms, S3 at 30 ms
        let stats = report.frequency.intervals.clone().unwrap();
        assert_eq!(stats.mean, Duration::from_millis(10));
        assert_eq!(report.log[0].elapsed_since_start, Duration::from_millis(20));

        // S2 measured against S0, S3 against S2
        assert_eq!(report.latency.count, 2);
        assert_eq!(report.latency.average, Some(Duration::from_millis(15)));
        assert_eq!(report.latency.tier, Some(LatencyTier::Excellent));

        assert_eq!(sink.changes, report.log, "Sink must see every logged change in order");
        assert_eq!(sink.reports.len(), 1);
        assert_eq!(sink.links, vec![LinkStatus::Up]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_break_the_run() {
        let source = ScriptedSource::new(vec![
            Ok(snapshot(0.0, 12.6)),
            Err(MonitorError::Timeout("no response within 5 ms".to_string())),
            Err(MonitorError::Protocol("HTTP status 500".to_string())),
            Ok(snapshot(1.0, 12.6)),
        ]);
        let session = Session::new(Arc::new(source), settings(10, RunLimit::For(Duration::from_millis(35))));

        let started = Instant::now();
        let mut sink = MemorySink::default();
        let report = session.run(&mut sink).await;

        assert_eq!(report.snapshots, 2);
        assert_eq!(report.failures, 2);
        assert_eq!(
            sink.failures,
            vec![started + Duration::from_millis(10), started + Duration::from_millis(20)],
            "Failures must carry the instant their fetch was issued"
        );
        assert_eq!(report.frequency.total_events, 1);
        assert!(!report.frequency.is_sufficient());
        assert_eq!(sink.links, vec![LinkStatus::Up, LinkStatus::Down, LinkStatus::Up]);
        assert_eq!(report.link.total_failures, 2);
        // Latency spans the failed ticks back to the baseline
        assert_eq!(report.latency.last, Some(Duration::from_millis(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_ends_unbounded_run() {
        let mut source = MockTelemetrySource::new();
        source.expect_fetch().returning(|| Ok(TelemetrySnapshot::default()));

        let session = Session::new(Arc::new(source), settings(20, RunLimit::UntilStopped));
        let controller = session.controller();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            controller.stop();
        });

        let mut sink = MemorySink::default();
        let report = session.run(&mut sink).await;

        assert_eq!(report.snapshots, report.fetches);
        assert_eq!(report.duration, Duration::from_millis(2500));
        assert_eq!(sink.stats.len(), 2, "One stats update per elapsed second");
        assert_eq!(sink.stats[0].elapsed, Duration::from_secs(1));
        assert!((report.fetch_rate_hz - report.snapshots as f64 / 2.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_limit_runs_until_stopped() {
        let mut source = MockTelemetrySource::new();
        source.expect_fetch().returning(|| Ok(TelemetrySnapshot::default()));

        let session = Session::new(Arc::new(source), settings(20, RunLimit::For(Duration::MAX)));
        let controller = session.controller();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            controller.stop();
        });

        let mut sink = MemorySink::default();
        let report = session.run(&mut sink).await;

        assert_eq!(report.duration, Duration::from_millis(100));
        assert!(report.snapshots > 0);
    }

    #[tokio::test]
    async fn test_stop_before_run_yields_empty_report() {
        let mut source = MockTelemetrySource::new();
        source.expect_fetch().never();

        let session = Session::new(Arc::new(source), settings(20, RunLimit::UntilStopped));
        let controller = session.controller();
        controller.stop();

        let mut sink = MemorySink::default();
        let report = session.run(&mut sink).await;

        assert_eq!(report.fetches, 0);
        assert_eq!(report.snapshots, 0);
        assert_eq!(controller.state(), RunState::Stopped);
        assert_eq!(sink.reports.len(), 1);
    }

    /// Blocks the consumer so the queue backs up before the stop
    struct StallingSink {
        inner: MemorySink,
        stall: Duration,
    }

    impl EventSink for StallingSink {
        fn on_change(&mut self, event: &ChangeEvent) {
            self.inner.on_change(event);
        }

        fn on_snapshot(&mut self, snapshot: &TelemetrySnapshot) {
            std::thread::sleep(self.stall);
            self.inner.on_snapshot(snapshot);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_snapshots_are_drained_on_stop() {
        let mut source = MockTelemetrySource::new();
        source.expect_fetch().returning(|| Ok(TelemetrySnapshot::default()));

        let session = Session::new(Arc::new(source), settings(2, RunLimit::For(Duration::from_millis(40))));
        let controller = session.controller();

        let mut sink = StallingSink {
            inner: MemorySink::default(),
            stall: Duration::from_millis(5),
        };
        let report = session.run(&mut sink).await;

        assert!(report.fetches > 0);
        assert_eq!(
            report.snapshots + report.failures,
            report.fetches,
            "Every fetched outcome must be processed before the run ends"
        );
        assert_eq!(sink.inner.snapshots as u64, report.snapshots);
        assert_eq!(controller.state(), RunState::Stopped);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();

        let monitor = SessionSettings::monitor(&config);
        assert_eq!(monitor.poller.interval, Duration::from_millis(20));
        assert_eq!(monitor.poller.timeout, Duration::from_millis(15));
        assert_eq!(monitor.limit, RunLimit::UntilStopped);

        config.monitor.duration_s = Some(5);
        let bounded = SessionSettings::monitor(&config);
        assert_eq!(bounded.limit, RunLimit::For(Duration::from_secs(5)));

        let analysis = SessionSettings::analysis(&config);
        assert_eq!(analysis.poller.interval, Duration::from_millis(10));
        assert_eq!(analysis.poller.timeout, Duration::from_millis(8));
        assert_eq!(analysis.limit, RunLimit::For(Duration::from_secs(30)));
        assert_eq!(analysis.queue_capacity, 64);
    }

    #[test]
    fn test_stats_update_display() {
        let update = StatsUpdate {
            elapsed: Duration::from_secs(3),
            snapshots: 150,
            failures: 2,
            events: 12,
            link: LinkStatus::Up,
            latency_average: Some(Duration::from_millis(40)),
            latency_tier: Some(LatencyTier::Excellent),
        };
        assert_eq!(
            update.to_string(),
            "[   3.0s] 150 snapshots, 2 failures, 12 changes, link up, latency 40.0 ms (excellent)"
        );
    }
}
