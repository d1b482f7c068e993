//! Cumulative monitoring statistics.
//!
//! Counters survive restarts: they are loaded at startup and the complete set
//! is rewritten after every reportable transition and once more on stop.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::PresenceKind;
use crate::error::StatsError;

/// Counter snapshot.
///
/// `online_count + offline_count <= total_checks` holds at all times, since a
/// transition is only counted on a cycle that was also counted as a check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    /// Reported transitions into `Online`
    pub online_count: u64,
    /// Reported transitions into either offline state
    pub offline_count: u64,
    /// Cycles whose reading was successfully classified
    pub total_checks: u64,
    /// Transient failures (rate limits excluded)
    #[serde(rename = "errors_count")]
    pub error_count: u64,
    /// First successful check, in the reference zone
    pub start_time: Option<DateTime<FixedOffset>>,
}

impl Statistics {
    /// Count a successfully classified cycle.
    pub fn record_check(&mut self, now: DateTime<Tz>) {
        self.total_checks += 1;
        if self.start_time.is_none() {
            self.start_time = Some(now.fixed_offset());
        }
    }

    /// Count a reportable transition. Returns false for kinds with no counter.
    pub fn record_transition(&mut self, kind: PresenceKind) -> bool {
        match kind {
            PresenceKind::Online => self.online_count += 1,
            PresenceKind::OfflineKnown | PresenceKind::OfflineUnknown => self.offline_count += 1,
            PresenceKind::RecentlyOnline | PresenceKind::Hidden => return false,
        }
        true
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    /// Hours since `start_time`, if monitoring has ever started.
    pub fn monitored_hours(&self, now: DateTime<Tz>) -> Option<f64> {
        self.start_time
            .map(|start| (now.fixed_offset() - start).num_seconds().max(0) as f64 / 3600.0)
    }

    /// Get a summary string for display.
    pub fn summary(&self, now: DateTime<Tz>) -> String {
        let mut summary = format!(
            "Statistics:\n\
             - Online transitions: {}\n\
             - Offline transitions: {}\n\
             - Total checks: {}\n\
             - Errors: {}",
            self.online_count, self.offline_count, self.total_checks, self.error_count
        );
        if let Some(hours) = self.monitored_hours(now) {
            summary.push_str(&format!("\n - Monitored for: {hours:.2} hours"));
        }
        summary
    }
}

/// Durable storage for [`Statistics`].
pub trait StatsStore: Send {
    /// Persisted counters, or zeroed defaults if nothing was stored yet.
    fn load(&self) -> Result<Statistics, StatsError>;

    /// Replace the stored counters with `stats`.
    fn save(&mut self, stats: &Statistics) -> Result<(), StatsError>;
}

/// JSON file store. Saves go through a temporary file and a rename so a
/// reader never sees a half-written snapshot.
#[derive(Debug, Clone)]
pub struct JsonStatsFile {
    path: PathBuf,
}

impl JsonStatsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "statistics.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StatsStore for JsonStatsFile {
    fn load(&self) -> Result<Statistics, StatsError> {
        if !self.path.exists() {
            return Ok(Statistics::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&mut self, stats: &Statistics) -> Result<(), StatsError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(stats)?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.path)?;
        debug!(path = ?self.path, total_checks = stats.total_checks, "statistics saved");
        Ok(())
    }
}
