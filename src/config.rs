//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional. A missing file section falls back to
//! the same defaults as [`Config::default`].

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::detector::{ChannelScope, Thresholds};
use crate::analysis::latency::LatencyTiers;
use crate::error::{MonitorError, Result};

/// Longest accepted run, in seconds (one day)
pub const MAX_DURATION_S: u64 = 86_400;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub latency: LatencyConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telemetry source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Live display polling
#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_monitor_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Optional time limit; unset runs until stopped
    #[serde(default)]
    pub duration_s: Option<u64>,
}

/// Frequency analysis polling
#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_analysis_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_duration_s")]
    pub duration_s: u64,
}

/// Producer/consumer hand-off
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Per-field change thresholds
#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdConfig {
    #[serde(default = "default_attitude_deg")]
    pub roll_deg: f64,

    #[serde(default = "default_attitude_deg")]
    pub pitch_deg: f64,

    #[serde(default = "default_attitude_deg")]
    pub yaw_deg: f64,

    #[serde(default = "default_voltage_v")]
    pub voltage_v: f64,

    #[serde(default = "default_current")]
    pub current: f64,

    #[serde(default = "default_channel")]
    pub channel: i32,

    #[serde(default)]
    pub channel_scope: ChannelScope,
}

/// Latency tier cut-points
#[derive(Debug, Deserialize, Clone)]
pub struct LatencyConfig {
    #[serde(default = "default_excellent_below_ms")]
    pub excellent_below_ms: u64,

    #[serde(default = "default_good_below_ms")]
    pub good_below_ms: u64,
}

/// Event log export at run end
#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_export_dir")]
    pub dir: String,

    #[serde(default = "default_export_format")]
    pub format: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; empty logs to stdout only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
fn default_base_url() -> String { "http://localhost:8081".to_string() }

fn default_monitor_interval_ms() -> u64 { 20 }
fn default_monitor_timeout_ms() -> u64 { 15 }
fn default_stats_interval_ms() -> u64 { 1000 }

fn default_analysis_interval_ms() -> u64 { 10 }
fn default_analysis_timeout_ms() -> u64 { 8 }
fn default_duration_s() -> u64 { 30 }

fn default_queue_capacity() -> usize { 64 }

fn default_attitude_deg() -> f64 { 0.1 }
fn default_voltage_v() -> f64 { 0.01 }
fn default_current() -> f64 { 1.0 }
fn default_channel() -> i32 { 5 }

fn default_excellent_below_ms() -> u64 { 50 }
fn default_good_below_ms() -> u64 { 100 }

fn default_export_dir() -> String { "./logs".to_string() }
fn default_export_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self { base_url: default_base_url() }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_monitor_interval_ms(),
            timeout_ms: default_monitor_timeout_ms(),
            stats_interval_ms: default_stats_interval_ms(),
            duration_s: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_analysis_interval_ms(),
            timeout_ms: default_analysis_timeout_ms(),
            duration_s: default_duration_s(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { queue_capacity: default_queue_capacity() }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            roll_deg: default_attitude_deg(),
            pitch_deg: default_attitude_deg(),
            yaw_deg: default_attitude_deg(),
            voltage_v: default_voltage_v(),
            current: default_current(),
            channel: default_channel(),
            channel_scope: ChannelScope::default(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            excellent_below_ms: default_excellent_below_ms(),
            good_below_ms: default_good_below_ms(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_export_dir(),
            format: default_export_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: String::new(),
        }
    }
}

impl ThresholdConfig {
    /// Threshold table used by the change detector
    pub fn to_thresholds(&self) -> Thresholds {
        Thresholds {
            roll: self.roll_deg,
            pitch: self.pitch_deg,
            yaw: self.yaw_deg,
            voltage: self.voltage_v,
            current: self.current,
            channel: self.channel,
            channel_scope: self.channel_scope,
        }
    }
}

impl LatencyConfig {
    /// Tier cut-points used by the latency tracker
    pub fn to_tiers(&self) -> LatencyTiers {
        LatencyTiers {
            excellent_below: Duration::from_millis(self.excellent_below_ms),
            good_below: Duration::from_millis(self.good_below_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fpv_telemetry_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Called by [`Config::load`], and again by the binary after command line
    /// overrides are applied. Nothing is polled until this passes.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate source URL
        let url = reqwest::Url::parse(&self.source.base_url)
            .map_err(|e| MonitorError::config(format!("base_url '{}' is not a valid URL: {}", self.source.base_url, e)))?;
        if url.scheme() != "http" {
            return Err(MonitorError::config("base_url must use the http scheme"));
        }
        if url.host_str().is_none() {
            return Err(MonitorError::config("base_url must include a host"));
        }

        // Validate polling cadence and bounded backlog
        for (name, interval_ms, timeout_ms) in [
            ("monitor", self.monitor.interval_ms, self.monitor.timeout_ms),
            ("analysis", self.analysis.interval_ms, self.analysis.timeout_ms),
        ] {
            if interval_ms == 0 || interval_ms > 60000 {
                return Err(MonitorError::config(format!("{}.interval_ms must be between 1 and 60000", name)));
            }
            if timeout_ms == 0 {
                return Err(MonitorError::config(format!("{}.timeout_ms must be greater than 0", name)));
            }
            if timeout_ms >= interval_ms {
                return Err(MonitorError::config(format!(
                    "{}.timeout_ms ({}) must be less than {}.interval_ms ({})",
                    name, timeout_ms, name, interval_ms
                )));
            }
        }

        if self.monitor.stats_interval_ms == 0 || self.monitor.stats_interval_ms > 60000 {
            return Err(MonitorError::config("monitor.stats_interval_ms must be between 1 and 60000"));
        }

        for (name, duration_s) in [
            ("monitor", self.monitor.duration_s),
            ("analysis", Some(self.analysis.duration_s)),
        ] {
            if let Some(duration_s) = duration_s {
                if duration_s == 0 || duration_s > MAX_DURATION_S {
                    return Err(MonitorError::config(format!(
                        "{}.duration_s must be between 1 and {}",
                        name, MAX_DURATION_S
                    )));
                }
            }
        }

        if self.pipeline.queue_capacity == 0 {
            return Err(MonitorError::config("pipeline.queue_capacity must be greater than 0"));
        }

        // Validate thresholds
        for (name, value) in [
            ("roll_deg", self.thresholds.roll_deg),
            ("pitch_deg", self.thresholds.pitch_deg),
            ("yaw_deg", self.thresholds.yaw_deg),
            ("voltage_v", self.thresholds.voltage_v),
            ("current", self.thresholds.current),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(MonitorError::config(format!("thresholds.{} must be a finite value >= 0", name)));
            }
        }

        if self.thresholds.channel < 0 {
            return Err(MonitorError::config("thresholds.channel must be >= 0"));
        }

        // Validate latency tiers
        if self.latency.excellent_below_ms == 0 {
            return Err(MonitorError::config("latency.excellent_below_ms must be greater than 0"));
        }

        if self.latency.excellent_below_ms >= self.latency.good_below_ms {
            return Err(MonitorError::config("latency.excellent_below_ms must be less than latency.good_below_ms"));
        }

        // Validate export
        if self.export.enabled && self.export.dir.is_empty() {
            return Err(MonitorError::config("export.dir cannot be empty when enabled"));
        }

        if self.export.format != "jsonl" {
            return Err(MonitorError::config("export format must be 'jsonl' (only supported format)"));
        }

        // Validate log level
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(MonitorError::config(format!(
                "logging.level '{}' must be one of: trace, debug, info, warn, error",
                self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_matches_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.source.base_url, "http://localhost:8081");
        assert_eq!(config.monitor.interval_ms, 20);
        assert_eq!(config.analysis.interval_ms, 10);
        assert_eq!(config.analysis.duration_s, 30);
        assert_eq!(config.thresholds.channel_scope, ChannelScope::Primary);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[source]
base_url = "http://192.168.4.1:8081"

[analysis]
duration_s = 10

[thresholds]
roll_deg = 0.5
channel_scope = "all"

[latency]
excellent_below_ms = 20
good_below_ms = 40
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.source.base_url, "http://192.168.4.1:8081");
        assert_eq!(config.analysis.duration_s, 10);
        assert_eq!(config.thresholds.roll_deg, 0.5);
        assert_eq!(config.thresholds.pitch_deg, 0.1);
        assert_eq!(config.thresholds.channel_scope, ChannelScope::All);
        assert_eq!(config.latency.to_tiers().good_below, Duration::from_millis(40));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[monitor]\ninterval_ms = 10\ntimeout_ms = 10\n").unwrap();
        temp_file.flush().unwrap();

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, MonitorError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/monitor.toml").unwrap_err();
        assert!(matches!(err, MonitorError::Io(_)));
    }

    #[test]
    fn test_malformed_url() {
        let mut config = Config::default();
        config.source.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_http_url() {
        let mut config = Config::default();
        config.source.base_url = "ftp://localhost:8081".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_zero() {
        let mut config = Config::default();
        config.monitor.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_too_high() {
        let mut config = Config::default();
        config.analysis.interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_must_be_below_interval() {
        let mut config = Config::default();
        config.monitor.timeout_ms = config.monitor.interval_ms;
        assert!(config.validate().is_err(), "timeout equal to interval must be rejected");

        config.monitor.timeout_ms = config.monitor.interval_ms - 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_zero() {
        let mut config = Config::default();
        config.analysis.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_zero() {
        let mut config = Config::default();
        config.analysis.duration_s = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_upper_bound() {
        let mut config = Config::default();
        config.analysis.duration_s = MAX_DURATION_S;
        assert!(config.validate().is_ok());

        config.analysis.duration_s = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("analysis.duration_s"), "got {}", err);
    }

    #[test]
    fn test_monitor_duration_bounds() {
        let mut config = Config::default();
        config.monitor.duration_s = Some(60);
        assert!(config.validate().is_ok());

        config.monitor.duration_s = Some(0);
        assert!(config.validate().is_err());

        config.monitor.duration_s = Some(u64::MAX);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.duration_s"), "got {}", err);
    }

    #[test]
    fn test_queue_capacity_zero() {
        let mut config = Config::default();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_threshold() {
        let mut config = Config::default();
        config.thresholds.voltage_v = -0.01;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_threshold() {
        let mut config = Config::default();
        config.thresholds.yaw_deg = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_channel_threshold() {
        let mut config = Config::default();
        config.thresholds.channel = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_latency_tiers_out_of_order() {
        let mut config = Config::default();
        config.latency.excellent_below_ms = 100;
        config.latency.good_below_ms = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_export_dir_when_enabled() {
        let mut config = Config::default();
        config.export.enabled = true;
        config.export.dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_export_dir_when_disabled() {
        let mut config = Config::default();
        config.export.enabled = false;
        config.export.dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_export_format() {
        let mut config = Config::default();
        config.export.format = "csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_table_conversion() {
        let config = Config::default();
        let thresholds = config.thresholds.to_thresholds();
        assert_eq!(thresholds.roll, 0.1);
        assert_eq!(thresholds.voltage, 0.01);
        assert_eq!(thresholds.current, 1.0);
        assert_eq!(thresholds.channel, 5);
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_base_url(), "http://localhost:8081");
        assert_eq!(default_monitor_interval_ms(), 20);
        assert_eq!(default_monitor_timeout_ms(), 15);
        assert_eq!(default_stats_interval_ms(), 1000);
        assert_eq!(default_analysis_interval_ms(), 10);
        assert_eq!(default_analysis_timeout_ms(), 8);
        assert_eq!(default_duration_s(), 30);
        assert_eq!(default_queue_capacity(), 64);
        assert_eq!(default_attitude_deg(), 0.1);
        assert_eq!(default_voltage_v(), 0.01);
        assert_eq!(default_current(), 1.0);
        assert_eq!(default_channel(), 5);
        assert_eq!(default_excellent_below_ms(), 50);
        assert_eq!(default_good_below_ms(), 100);
        assert_eq!(default_export_dir(), "./logs");
        assert_eq!(default_export_format(), "jsonl");
        assert_eq!(default_log_level(), "info");
    }
}
