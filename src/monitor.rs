//! The polling loop.
//!
//! Drives [`LoopState`] from `Connecting` to `Stopped`: reads presence through
//! the client, classifies and edge-triggers it, reports transitions, keeps the
//! statistics current and sleeps as the failure policy dictates. Sleeps and
//! client calls are the only suspension points, and each of them races the
//! cancellation token.

use chrono_tz::Tz;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ContactHandle, PresenceClient, RawPresence};
use crate::config::Config;
use crate::core::{classify, FailurePolicy, LoopState, PresenceState, StopReason, TransitionTracker};
use crate::error::{ClientError, StatsError};
use crate::report::Reporter;
use crate::stats::{Statistics, StatsStore};

/// Settings the loop needs from configuration.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub target: String,
    pub check_interval: Duration,
    pub zone: Tz,
    pub rate_limit_grace: Duration,
    pub max_consecutive_errors: u32,
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            target: config.target.clone(),
            check_interval: config.check_interval,
            zone: config.reference_time_zone,
            rate_limit_grace: config.rate_limit_grace,
            max_consecutive_errors: config.max_consecutive_errors,
        }
    }
}

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub reason: StopReason,
    pub stats: Statistics,
    /// Reported transitions, in order
    pub transitions: Vec<PresenceState>,
    pub contact: Option<ContactHandle>,
    pub session_id: Uuid,
}

/// Single-contact presence monitor.
pub struct PresenceMonitor<C, S> {
    client: C,
    store: S,
    reporter: Reporter,
    settings: MonitorSettings,
    cancel: CancellationToken,
    stats: Statistics,
    tracker: TransitionTracker,
    policy: FailurePolicy,
    contact: Option<ContactHandle>,
    transitions: Vec<PresenceState>,
    session_id: Uuid,
}

impl<C, S> PresenceMonitor<C, S>
where
    C: PresenceClient,
    S: StatsStore,
{
    /// Create a monitor, loading cumulative statistics from `store`.
    pub fn new(
        client: C,
        store: S,
        reporter: Reporter,
        settings: MonitorSettings,
        cancel: CancellationToken,
    ) -> Result<Self, StatsError> {
        let stats = store.load()?;
        let policy = FailurePolicy::new(settings.check_interval)
            .with_rate_limit_grace(settings.rate_limit_grace)
            .with_max_consecutive_errors(settings.max_consecutive_errors);

        Ok(Self {
            client,
            store,
            reporter,
            settings,
            cancel,
            stats,
            tracker: TransitionTracker::new(),
            policy,
            contact: None,
            transitions: Vec::new(),
            session_id: Uuid::new_v4(),
        })
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Run until stopped. Statistics are saved and the client disconnected
    /// exactly once on the way out, whatever the reason.
    pub async fn run(mut self) -> MonitorReport {
        let mut state = LoopState::Connecting;
        let reason = loop {
            debug!(?state, "loop state");
            state = match state {
                LoopState::Connecting => self.connect().await,
                LoopState::Polling => self.poll().await,
                LoopState::Stopped(reason) => break reason,
                sleeping => {
                    let wait = sleeping.sleep().unwrap_or_default();
                    self.pause(wait).await
                }
            };
        };
        self.shutdown(reason).await
    }

    async fn connect(&mut self) -> LoopState {
        info!(identifier = %self.settings.target, "connecting");
        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LoopState::Stopped(StopReason::Cancelled),
            result = self.client.connect() => result,
        };
        if let Err(e) = connected {
            return self.configuration_failure(e);
        }

        let resolved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LoopState::Stopped(StopReason::Cancelled),
            result = self.client.resolve_contact(&self.settings.target) => result,
        };
        match resolved {
            Ok(contact) => {
                info!(contact = %contact.describe(), id = %contact.id, "contact resolved");
                self.reporter
                    .open_session(&contact.describe(), &self.session_id.to_string());
                self.contact = Some(contact);
                LoopState::Polling
            }
            Err(e) => self.configuration_failure(e),
        }
    }

    fn configuration_failure(&self, error: ClientError) -> LoopState {
        self.reporter.error(format!("setup failed: {error}"));
        LoopState::Stopped(StopReason::Configuration(error.to_string()))
    }

    async fn poll(&mut self) -> LoopState {
        let Some(contact) = self.contact.as_ref() else {
            return LoopState::Connecting;
        };
        let reading = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return LoopState::Stopped(StopReason::Cancelled),
            result = self.client.get_presence(contact) => result,
        };

        match reading {
            Ok(reading) => {
                self.observe(&reading);
                self.policy.on_success()
            }
            Err(error) => self.on_error(error),
        }
    }

    /// Classify one reading and report it if it is a transition.
    fn observe(&mut self, reading: &RawPresence) {
        let now = self.reporter.now();
        let state = classify(reading, self.settings.zone);
        self.stats.record_check(now);

        if self.tracker.observe(&state) {
            self.reporter.event(state.describe());
            self.stats.record_transition(state.kind());
            self.transitions.push(state);
            self.persist();
        } else {
            debug!(state = %state.kind(), "no transition");
        }

        debug_assert!(
            self.stats.online_count + self.stats.offline_count <= self.stats.total_checks
        );
    }

    fn on_error(&mut self, error: ClientError) -> LoopState {
        let next = self.policy.on_error(&error);
        match (&error, next.sleep()) {
            (ClientError::RateLimited { .. }, Some(wait)) => {
                let secs = wait.as_secs();
                self.reporter.error(format!(
                    "rate limited, waiting {secs}s ({}m {}s)",
                    secs / 60,
                    secs % 60
                ));
            }
            _ => {
                self.stats.record_error();
                self.reporter.error(format!(
                    "error #{}: {error}",
                    self.policy.consecutive_errors()
                ));
            }
        }
        next
    }

    async fn pause(&self, wait: Duration) -> LoopState {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => LoopState::Stopped(StopReason::Cancelled),
            _ = tokio::time::sleep(wait) => LoopState::Polling,
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.stats) {
            warn!("could not save statistics: {e}");
        }
    }

    async fn shutdown(mut self, reason: StopReason) -> MonitorReport {
        info!(%reason, "monitor stopped");
        self.reporter
            .close_session(&reason.to_string(), reason.is_fatal());
        self.persist();
        self.client.disconnect().await;

        MonitorReport {
            reason,
            stats: self.stats,
            transitions: self.transitions,
            contact: self.contact,
            session_id: self.session_id,
        }
    }
}
