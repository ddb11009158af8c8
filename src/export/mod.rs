//! # Export Module
//!
//! Writes a finished run to disk: the change log as JSON Lines and the
//! report as a single JSON document. Both files share a local-time stamp so
//! they sort together.

use chrono::Local;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analysis::event::{ChangeEvent, ChangeKind, FieldValue};
use crate::config::ExportConfig;
use crate::error::Result;
use crate::pipeline::session::RunReport;

/// One line of the events file
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    elapsed_ms: f64,
    kind: ChangeKind,
    old: &'a FieldValue,
    new: &'a FieldValue,
}

impl<'a> From<&'a ChangeEvent> for EventRecord<'a> {
    fn from(event: &'a ChangeEvent) -> Self {
        Self {
            elapsed_ms: event.elapsed_since_start.as_nanos() as f64 / 1e6,
            kind: event.kind,
            old: &event.old_value,
            new: &event.new_value,
        }
    }
}

/// Files written by one export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub events: PathBuf,
    pub summary: PathBuf,
}

/// Writes run results into a directory
#[derive(Debug, Clone)]
pub struct RunExporter {
    dir: PathBuf,
}

impl RunExporter {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// `None` when export is disabled
    pub fn from_config(config: &ExportConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(&config.dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `events-<stamp>.jsonl` and `summary-<stamp>.json`
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory or either file cannot be written
    pub fn export(&self, report: &RunReport) -> Result<ExportPaths> {
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        self.export_with_stamp(report, &stamp)
    }

    fn export_with_stamp(&self, report: &RunReport, stamp: &str) -> Result<ExportPaths> {
        fs::create_dir_all(&self.dir)?;

        let paths = ExportPaths {
            events: self.dir.join(format!("events-{}.jsonl", stamp)),
            summary: self.dir.join(format!("summary-{}.json", stamp)),
        };

        let mut events = BufWriter::new(File::create(&paths.events)?);
        for event in &report.log {
            serde_json::to_writer(&mut events, &EventRecord::from(event))?;
            events.write_all(b"\n")?;
        }
        events.flush()?;

        let mut summary = BufWriter::new(File::create(&paths.summary)?);
        serde_json::to_writer_pretty(&mut summary, report)?;
        summary.flush()?;

        info!(
            "Exported {} events to {} and summary to {}",
            report.log.len(),
            paths.events.display(),
            paths.summary.display()
        );
        Ok(paths)
    }
}
