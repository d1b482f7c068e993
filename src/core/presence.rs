//! Presence classification.
//!
//! Maps a raw reading from the messaging client onto the closed set of
//! semantic states the monitor reasons about. Timestamps are moved into the
//! reference time zone and truncated to whole seconds here, so everything
//! downstream compares and prints the same value.

use chrono::{DateTime, SubsecRound};
use chrono_tz::Tz;
use std::fmt;

use crate::client::RawPresence;

/// Format used for every human-readable timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Semantic presence state of the monitored contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    Online,
    /// Offline with a known last-seen instant in the reference zone.
    OfflineKnown { last_seen: DateTime<Tz> },
    OfflineUnknown,
    RecentlyOnline,
    /// Last-seen is privacy-restricted or otherwise unrecognized.
    Hidden,
}

/// Discriminant of [`PresenceState`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceKind {
    Online,
    OfflineKnown,
    OfflineUnknown,
    RecentlyOnline,
    Hidden,
}

impl PresenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceKind::Online => "online",
            PresenceKind::OfflineKnown => "offline",
            PresenceKind::OfflineUnknown => "offline_unknown",
            PresenceKind::RecentlyOnline => "recently",
            PresenceKind::Hidden => "hidden",
        }
    }
}

impl fmt::Display for PresenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PresenceState {
    pub fn kind(&self) -> PresenceKind {
        match self {
            PresenceState::Online => PresenceKind::Online,
            PresenceState::OfflineKnown { .. } => PresenceKind::OfflineKnown,
            PresenceState::OfflineUnknown => PresenceKind::OfflineUnknown,
            PresenceState::RecentlyOnline => PresenceKind::RecentlyOnline,
            PresenceState::Hidden => PresenceKind::Hidden,
        }
    }

    /// Last-seen rendered to second precision, for `OfflineKnown` only.
    pub fn last_seen_label(&self) -> Option<String> {
        match self {
            PresenceState::OfflineKnown { last_seen } => {
                Some(last_seen.format(TIMESTAMP_FORMAT).to_string())
            }
            _ => None,
        }
    }

    /// Message written for a reportable transition into this state.
    pub fn describe(&self) -> String {
        match self {
            PresenceState::Online => "came online".to_string(),
            PresenceState::OfflineKnown { last_seen } => format!(
                "went offline, last seen {}",
                last_seen.format(TIMESTAMP_FORMAT)
            ),
            PresenceState::OfflineUnknown => "offline (last seen unknown)".to_string(),
            PresenceState::RecentlyOnline => "was online recently".to_string(),
            PresenceState::Hidden => "status hidden (last seen disabled)".to_string(),
        }
    }
}

/// Classify a raw reading in the given reference time zone.
pub fn classify(reading: &RawPresence, zone: Tz) -> PresenceState {
    match reading {
        RawPresence::Online { .. } => PresenceState::Online,
        RawPresence::Offline { was_online: None } => PresenceState::OfflineUnknown,
        RawPresence::Offline {
            was_online: Some(at),
        } => PresenceState::OfflineKnown {
            last_seen: at.with_timezone(&zone).trunc_subsecs(0),
        },
        RawPresence::Recently => PresenceState::RecentlyOnline,
        RawPresence::LastWeek | RawPresence::LastMonth | RawPresence::Empty => {
            PresenceState::Hidden
        }
    }
}
