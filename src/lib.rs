//! Presence Monitor - edge-triggered presence tracking for one messaging contact.
//!
//! This library polls a messaging client for a single contact's presence,
//! reduces each reading to a small set of states, and reports only the
//! readings that differ from the last one reported.
//!
//! # Behavior
//!
//! - **Edge-triggered**: repeated identical readings produce one log line
//! - **Last-seen aware**: an offline reading with a newer last-seen is a new event
//! - **Rate-limit friendly**: service-imposed waits are honored plus a grace period
//! - **Bounded retries**: consecutive transient failures eventually stop the loop
//! - **Durable counters**: statistics survive restarts
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Presence Monitor                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Client    │──▶│  Classify   │──▶│   Tracker   │         │
//! │  │ (bridge /   │   │ (ref. zone) │   │ (edge rule) │         │
//! │  │   replay)   │   └─────────────┘   └─────────────┘         │
//! │  └─────────────┘                            │                │
//! │         ▲                                   ▼                │
//! │  ┌─────────────┐                     ┌─────────────┐         │
//! │  │   Failure   │                     │  Reporter   │         │
//! │  │   Policy    │                     │ + Stats     │         │
//! │  └─────────────┘                     └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use presence_monitor::{
//!     client::ReplayClient, monitor::MonitorSettings, JsonStatsFile, PresenceMonitor, Reporter,
//! };
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ReplayClient::from_path("demo.jsonl".as_ref())?;
//! let settings = MonitorSettings {
//!     target: "@someone".to_string(),
//!     check_interval: Duration::from_secs(10),
//!     zone: chrono_tz::Asia::Tehran,
//!     rate_limit_grace: Duration::from_secs(10),
//!     max_consecutive_errors: 5,
//! };
//! let reporter = Reporter::new("online_log.txt", settings.zone);
//! let store = JsonStatsFile::new("statistics.json");
//!
//! let monitor = PresenceMonitor::new(client, store, reporter, settings, CancellationToken::new())?;
//! let report = monitor.run().await;
//! println!("stopped: {}", report.reason);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod monitor;
pub mod report;
pub mod stats;

// Re-export key types at crate root for convenience
pub use client::{ContactHandle, PresenceClient, RawPresence, ReplayClient};
pub use config::{ClientConfig, Config};
pub use crate::core::{classify, PresenceState, StopReason, TransitionTracker};
pub use error::{ClientError, ConfigError, StatsError};
pub use monitor::{MonitorReport, MonitorSettings, PresenceMonitor};
pub use report::{LogEvent, Reporter};
pub use stats::{JsonStatsFile, Statistics, StatsStore};

#[cfg(feature = "bridge")]
pub use client::{BridgeClient, BridgeConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
