//! Error types for the presence monitor.

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a messaging client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Session could not be established (bad credentials, unreachable service).
    #[error("connection failed: {0}")]
    Connect(String),

    /// The target contact could not be resolved.
    #[error("could not resolve contact '{identifier}': {reason}")]
    Resolution { identifier: String, reason: String },

    /// The service asked us to pause before the next request.
    #[error("rate limited for {}s", .wait.as_secs())]
    RateLimited { wait: Duration },

    /// Any other failure during a read. Retried within the error budget.
    #[error("{0}")]
    Transient(String),
}

impl ClientError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rate_limited(secs: u64) -> Self {
        Self::RateLimited {
            wait: Duration::from_secs(secs),
        }
    }

    pub fn resolution(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

/// Statistics persistence errors.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
