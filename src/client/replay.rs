//! File-backed scripted client.
//!
//! Plays back presence readings from a JSON-lines script, one step per poll.
//! Useful for dry runs of a configuration and for exercising the failure
//! policy without a live session.
//!
//! ```text
//! {"status":"online"}
//! {"status":"offline","was_online":"2024-03-01T10:00:00Z"}
//! {"status":"rate_limited","seconds":30}
//! {"status":"error","message":"connection reset"}
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

use crate::client::types::{ContactHandle, RawPresence};
use crate::client::PresenceClient;
use crate::error::{ClientError, ConfigError};

/// Scripted failure injected in place of a reading.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptedFailure {
    RateLimited { seconds: u64 },
    Error { message: String },
}

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Failure(ScriptedFailure),
    Reading(RawPresence),
}

impl From<RawPresence> for ScriptStep {
    fn from(reading: RawPresence) -> Self {
        ScriptStep::Reading(reading)
    }
}

/// A client that replays a fixed script of readings.
#[derive(Debug)]
pub struct ReplayClient {
    steps: VecDeque<ScriptStep>,
    connected: bool,
}

impl ReplayClient {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            connected: false,
        }
    }

    /// Load a script from a JSON-lines file. Blank lines and `#` comments are skipped.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(script: &str) -> Result<Self, ConfigError> {
        let steps = script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| serde_json::from_str::<ScriptStep>(line))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::Parse)?;
        Ok(Self::new(steps))
    }

    /// Steps not yet played.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl PresenceClient for ReplayClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        self.connected = true;
        Ok(())
    }

    async fn resolve_contact(&mut self, identifier: &str) -> Result<ContactHandle, ClientError> {
        if identifier.trim().is_empty() {
            return Err(ClientError::resolution(identifier, "empty identifier"));
        }
        Ok(ContactHandle {
            id: identifier.to_string(),
            display_name: identifier.to_string(),
            username: None,
        })
    }

    async fn get_presence(&mut self, _contact: &ContactHandle) -> Result<RawPresence, ClientError> {
        if !self.connected {
            return Err(ClientError::transient("replay client is not connected"));
        }
        match self.steps.pop_front() {
            Some(ScriptStep::Reading(reading)) => Ok(reading),
            Some(ScriptStep::Failure(ScriptedFailure::RateLimited { seconds })) => {
                Err(ClientError::rate_limited(seconds))
            }
            Some(ScriptStep::Failure(ScriptedFailure::Error { message })) => {
                Err(ClientError::Transient(message))
            }
            None => Err(ClientError::transient("replay script exhausted")),
        }
    }

    async fn disconnect(&mut self) {
        debug!(remaining = self.steps.len(), "replay client disconnected");
        self.connected = false;
    }
}
