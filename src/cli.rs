//! Command line interface.
//!
//! Flags override values from the configuration file; the merged
//! configuration is validated afterwards.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use fpv_telemetry_monitor::analysis::detector::ChannelScope;
use fpv_telemetry_monitor::config::Config;

#[derive(Parser, Debug)]
#[command(name = "fpv-telemetry-monitor", version)]
#[command(about = "Measure how fast and how often an FPV telemetry feed changes")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "FPV_MONITOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the telemetry bridge (e.g. http://192.168.4.1:8081)
    #[arg(short, long, env = "FPV_MONITOR_URL", global = true)]
    pub url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Live display: log every change until Ctrl+C
    Monitor {
        #[command(flatten)]
        poll: PollArgs,

        /// Log a line for every received snapshot
        #[arg(long)]
        show_snapshots: bool,
    },

    /// Timed frequency analysis with a final report
    Analyze {
        #[command(flatten)]
        poll: PollArgs,
    },

    /// Send one command to the bridge and print the acknowledgement
    #[command(name = "command")]
    SendCommand {
        /// Command name (e.g. setMode, setChannel)
        cmd: String,

        /// Command value (e.g. auto, 1=1500)
        value: String,
    },
}

/// Polling overrides shared by `monitor` and `analyze`
#[derive(Args, Debug, Default)]
pub struct PollArgs {
    /// Poll interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Run duration in seconds
    #[arg(short, long)]
    pub duration_s: Option<u64>,

    /// Compare all 16 channels instead of the first four
    #[arg(long)]
    pub all_channels: bool,

    /// Export the event log and summary at run end
    #[arg(long)]
    pub export: bool,
}

impl Cli {
    /// Merge command line overrides into `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.source.base_url = url.clone();
        }

        match self.verbose {
            0 => {}
            1 => config.logging.level = "debug".to_string(),
            _ => config.logging.level = "trace".to_string(),
        }

        match &self.command {
            Command::Monitor { poll, .. } => {
                if let Some(interval_ms) = poll.interval_ms {
                    config.monitor.interval_ms = interval_ms;
                }
                if let Some(timeout_ms) = poll.timeout_ms {
                    config.monitor.timeout_ms = timeout_ms;
                }
                if poll.duration_s.is_some() {
                    config.monitor.duration_s = poll.duration_s;
                }
                poll.apply_common(config);
            }
            Command::Analyze { poll } => {
                if let Some(interval_ms) = poll.interval_ms {
                    config.analysis.interval_ms = interval_ms;
                }
                if let Some(timeout_ms) = poll.timeout_ms {
                    config.analysis.timeout_ms = timeout_ms;
                }
                if let Some(duration_s) = poll.duration_s {
                    config.analysis.duration_s = duration_s;
                }
                poll.apply_common(config);
            }
            Command::SendCommand { .. } => {}
        }
    }
}

impl PollArgs {
    fn apply_common(&self, config: &mut Config) {
        if self.all_channels {
            config.thresholds.channel_scope = ChannelScope::All;
        }
        if self.export {
            config.export.enabled = true;
        }
    }
}
