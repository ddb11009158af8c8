//! # FPV Telemetry Monitor
//!
//! Measure how fast and how often an FPV telemetry feed actually changes.
//!
//! This application polls the bridge's `/api/telemetry` endpoint, logs every
//! field change that exceeds its noise threshold, and reports change
//! frequency and detection latency.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::{Cli, Command};
use fpv_telemetry_monitor::config::{Config, LoggingConfig};
use fpv_telemetry_monitor::export::RunExporter;
use fpv_telemetry_monitor::pipeline::session::{RunLimit, Session, SessionSettings};
use fpv_telemetry_monitor::sink::TracingSink;
use fpv_telemetry_monitor::telemetry::command::CommandClient;
use fpv_telemetry_monitor::telemetry::source::{HttpTelemetrySource, TelemetrySource};

/// Timeout for the startup probe and for commands
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Log file name prefix inside `logging.dir`
const LOG_FILE_PREFIX: &str = "fpv-telemetry-monitor.log";

/// Main entry point for FPV Telemetry Monitor
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse the command line and load the configuration file, if any
///    - Apply command line overrides and validate the result
///    - Set up logging (stdout plus an optional daily rolling file)
///
/// 2. **Startup Probe**
///    - Fetch one snapshot; an unreachable source aborts with a non-zero exit
///
/// 3. **Run**
///    - `monitor`: log every change until Ctrl+C (or `--duration-s`)
///    - `analyze`: poll for `analysis.duration_s`, then print the report
///    - Ctrl+C stops polling; queued snapshots are still processed
///
/// 4. **Export**
///    - Write the event log and summary when export is enabled
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be read or is invalid
/// - The telemetry source is unreachable at startup
/// - A command is rejected
/// - Export fails
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let _log_guard = init_logging(&config.logging)?;

    info!("FPV Telemetry Monitor v{} starting...", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Monitor { show_snapshots, .. } => {
            let settings = SessionSettings::monitor(&config);
            run_session(&config, settings, TracingSink::new(*show_snapshots)).await
        }
        Command::Analyze { .. } => {
            let settings = SessionSettings::analysis(&config);
            run_session(&config, settings, TracingSink::new(false)).await
        }
        Command::SendCommand { cmd, value } => send_command(&config, cmd, value).await,
    }
}

/// Install the tracing subscriber
///
/// The returned guard flushes the file writer on drop and must live until exit.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = config
        .level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", config.level))?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if config.dir.is_empty() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(Some(guard))
}

/// Fetch one snapshot to make sure the source is there before polling
async fn probe(base_url: &str) -> Result<()> {
    let source = HttpTelemetrySource::new(base_url, REQUEST_TIMEOUT)?;
    let snapshot = source
        .fetch()
        .await
        .with_context(|| format!("Telemetry source unreachable at {}", source.url()))?;

    info!(
        "Connected to {} (port '{}', mode '{}', link {})",
        source.url(),
        snapshot.active_port,
        snapshot.work_mode,
        if snapshot.link_up { "up" } else { "down" }
    );
    Ok(())
}

async fn run_session(config: &Config, settings: SessionSettings, mut sink: TracingSink) -> Result<()> {
    probe(&config.source.base_url).await?;

    let source = HttpTelemetrySource::new(&config.source.base_url, settings.poller.timeout)?;

    match settings.limit {
        RunLimit::For(limit) => info!("Running for {:.0} s, press Ctrl+C to stop early", limit.as_secs_f64()),
        RunLimit::UntilStopped => info!("Press Ctrl+C to stop"),
    }

    let session = Session::new(Arc::new(source), settings);

    // Handle Ctrl+C for graceful shutdown
    let controller = session.controller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            controller.stop();
        }
    });

    let report = session.run(&mut sink).await;

    if let Some(exporter) = RunExporter::from_config(&config.export) {
        exporter.export(&report).context("Failed to export run")?;
    }

    Ok(())
}

async fn send_command(config: &Config, cmd: &str, value: &str) -> Result<()> {
    let client = CommandClient::new(&config.source.base_url, REQUEST_TIMEOUT)?;
    let ack = client
        .send(cmd, value)
        .await
        .with_context(|| format!("Command '{}' failed", cmd))?;

    if !ack.is_ok() {
        bail!("Bridge answered '{}' to {}={}", ack.status, ack.command, ack.value);
    }
    Ok(())
}
