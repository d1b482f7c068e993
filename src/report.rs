//! Transition reporting.
//!
//! Every event goes to the console and is appended to the transition log.
//! Log writes are best-effort: a failure is surfaced as a warning and the
//! monitor carries on.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::TIMESTAMP_FORMAT;

const SEPARATOR: &str = "======================================================================";

/// A single timestamped line in the transition log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Tz>,
    pub message: String,
}

impl LogEvent {
    pub fn line(&self) -> String {
        format!("[{}] {}", self.timestamp.format(TIMESTAMP_FORMAT), self.message)
    }
}

/// Severity decides which console stream a line goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Out,
    Err,
}

/// Writes events to the append-only log and the console.
#[derive(Debug, Clone)]
pub struct Reporter {
    log_path: PathBuf,
    zone: Tz,
    console: bool,
}

impl Reporter {
    pub fn new(log_path: impl Into<PathBuf>, zone: Tz) -> Self {
        Self {
            log_path: log_path.into(),
            zone,
            console: true,
        }
    }

    /// Disable console echo (file only).
    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Current time in the reference zone.
    pub fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.zone)
    }

    /// Report an informational event.
    pub fn event(&self, message: impl Into<String>) -> LogEvent {
        self.emit(message.into(), Stream::Out)
    }

    /// Report an error or warning event.
    pub fn error(&self, message: impl Into<String>) -> LogEvent {
        self.emit(message.into(), Stream::Err)
    }

    /// Session header written when polling begins.
    pub fn open_session(&self, contact: &str, session_id: &str) {
        self.append(&format!("\n{SEPARATOR}"));
        self.append(
            &LogEvent {
                timestamp: self.now(),
                message: format!("monitoring started (session {session_id})"),
            }
            .line(),
        );
        self.append(&format!("contact: {contact}"));
        self.append(SEPARATOR);
    }

    /// Session footer written once when the loop stops.
    pub fn close_session(&self, reason: &str, fatal: bool) {
        if fatal {
            self.error(reason);
        } else {
            self.event(reason);
        }
        self.append(&format!("{SEPARATOR}\n"));
    }

    fn emit(&self, message: String, stream: Stream) -> LogEvent {
        let event = LogEvent {
            timestamp: self.now(),
            message,
        };
        let line = event.line();
        if self.console {
            match stream {
                Stream::Out => println!("{line}"),
                Stream::Err => eprintln!("{line}"),
            }
        }
        self.append(&line);
        event
    }

    fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line) {
            warn!(path = ?self.log_path, "could not write transition log: {e}");
        }
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{line}")
    }
}
