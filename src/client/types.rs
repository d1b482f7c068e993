//! Readings and handles exchanged with the messaging client.
//!
//! These mirror what the messaging service reports about a contact. They carry
//! no interpretation; classification happens in [`crate::core::presence`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw presence reading as reported by the messaging service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RawPresence {
    /// Contact is online right now.
    Online {
        /// When the service will consider the contact offline unless refreshed
        #[serde(default)]
        expires: Option<DateTime<Utc>>,
    },
    /// Contact is offline, optionally with the exact last-seen instant.
    Offline {
        #[serde(default)]
        was_online: Option<DateTime<Utc>>,
    },
    /// Approximate "last seen recently" state.
    Recently,
    /// Approximate "last seen within a week" state.
    LastWeek,
    /// Approximate "last seen within a month" state.
    LastMonth,
    /// Nothing reported (privacy-restricted last-seen).
    Empty,
}

impl RawPresence {
    pub fn offline_at(was_online: DateTime<Utc>) -> Self {
        Self::Offline {
            was_online: Some(was_online),
        }
    }
}

/// A resolved reference to the monitored contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactHandle {
    /// Service-side identifier used for presence reads
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    /// Public username, if the contact has one
    #[serde(default)]
    pub username: Option<String>,
}

impl ContactHandle {
    /// One-line description for headers and log banners.
    pub fn describe(&self) -> String {
        match &self.username {
            Some(username) => format!("{} (@{username})", self.display_name),
            None => format!("{} (no username)", self.display_name),
        }
    }
}
