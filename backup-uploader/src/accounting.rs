//! Job-scoped event accounting.
//!
//! Every message the core emits for a job goes through [`Accounting`]. Events
//! are appended, never rewritten, mirrored to `tracing`, and (unless recorded
//! as screen-only) persisted to the job log file as
//! `timestamp \t LEVEL \t message`. Warnings and errors are counted for the
//! final summary.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::Write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Severity of a [`LogEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub message: String,
}

impl LogEvent {
    /// Render the event as one log file line (without the trailing newline).
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }
}

/// Final warning/error counts of a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub warnings: u32,
    pub errors: u32,
}

/// Event sink for one job.
pub struct Accounting {
    job_id: String,
    sink: Option<File>,
    events: Vec<LogEvent>,
    counters: Counters,
}

impl Accounting {
    /// Accounting that only mirrors to `tracing` and keeps events in memory.
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            sink: None,
            events: Vec::new(),
            counters: Counters::default(),
        }
    }

    /// Accounting that also appends persisted events to `file`.
    pub fn with_log_file(job_id: impl Into<String>, file: File) -> Self {
        Self {
            sink: Some(file),
            ..Self::new(job_id)
        }
    }

    /// Record an event, persisting it to the log file.
    pub fn record(&mut self, level: Level, message: impl Into<String>) {
        self.emit(level, message.into(), true);
    }

    /// Record a screen-only event. It is counted but never persisted.
    pub fn note(&mut self, level: Level, message: impl Into<String>) {
        self.emit(level, message.into(), false);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(Level::Error, message);
    }

    fn emit(&mut self, level: Level, message: String, persist: bool) {
        match level {
            Level::Info => tracing::info!(job_id = %self.job_id, "{}", message),
            Level::Warn => {
                self.counters.warnings += 1;
                tracing::warn!(job_id = %self.job_id, "{}", message)
            }
            Level::Error => {
                self.counters.errors += 1;
                tracing::error!(job_id = %self.job_id, "{}", message)
            }
        }

        let event = LogEvent {
            timestamp: Local::now(),
            level,
            message,
        };

        if persist {
            if let Some(file) = self.sink.as_mut() {
                if let Err(e) = writeln!(file, "{}", event.to_line()) {
                    tracing::warn!(job_id = %self.job_id, "Failed to write job log: {}", e);
                }
            }
        }

        self.events.push(event);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn warnings(&self) -> u32 {
        self.counters.warnings
    }

    pub fn errors(&self) -> u32 {
        self.counters.errors
    }

    /// Flush and close the log file. Later events are kept in memory only.
    pub fn close(&mut self) {
        if let Some(mut file) = self.sink.take() {
            if let Err(e) = file.sync_all() {
                tracing::warn!(job_id = %self.job_id, "Failed to sync job log: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counters_only_track_warn_and_error() {
        let mut acc = Accounting::new("job");
        acc.info("starting");
        acc.warn("file missing");
        acc.error("write failed");
        acc.note(Level::Warn, "screen only");
        acc.note(Level::Info, "screen only info");

        assert_eq!(acc.warnings(), 2);
        assert_eq!(acc.errors(), 1);
        assert_eq!(acc.events().len(), 5);
    }

    #[test]
    fn test_log_file_lines() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("job.log");
        let file = File::create(&path)?;

        let mut acc = Accounting::with_log_file("job", file);
        acc.info("persisted");
        acc.note(Level::Info, "not persisted");
        acc.warn("persisted warning");
        acc.close();

        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let fields: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1], "INFO");
        assert_eq!(fields[2], "persisted");
        assert!(lines[1].ends_with("\tWARN\tpersisted warning"));
        Ok(())
    }

    #[test]
    fn test_events_after_close_are_kept() {
        let mut acc = Accounting::new("job");
        acc.close();
        acc.error("late");
        assert_eq!(acc.errors(), 1);
        assert_eq!(acc.events()[0].message, "late");
    }
}
