//! Polling loop states and the failure policy that moves between them.
//!
//! Everything here is synchronous and side-effect free; the async driver in
//! [`crate::monitor`] performs the sleeps and I/O each state calls for.

use std::fmt;
use std::time::Duration;

use crate::error::ClientError;

/// Consecutive transient failures tolerated before the loop gives up.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Extra wait added on top of a rate-limit instruction.
pub const DEFAULT_RATE_LIMIT_GRACE: Duration = Duration::from_secs(10);

/// State of the polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    /// Establishing the session and resolving the contact.
    Connecting,
    /// Performing one presence read.
    Polling,
    /// Sleeping for the check interval after a successful cycle.
    Waiting { wait: Duration },
    /// Sleeping out a rate-limit instruction.
    Backoff { wait: Duration },
    /// Sleeping before retrying after a transient failure.
    Retrying { wait: Duration, attempt: u32 },
    /// Terminal.
    Stopped(StopReason),
}

impl LoopState {
    pub fn is_stopped(&self) -> bool {
        matches!(self, LoopState::Stopped(_))
    }

    /// How long this state sleeps before polling again, if it is a sleeping state.
    pub fn sleep(&self) -> Option<Duration> {
        match self {
            LoopState::Waiting { wait }
            | LoopState::Backoff { wait }
            | LoopState::Retrying { wait, .. } => Some(*wait),
            _ => None,
        }
    }
}

/// Why the loop reached [`LoopState::Stopped`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// User-initiated cancellation.
    Cancelled,
    /// The session or the contact could not be set up. Not retried.
    Configuration(String),
    /// Too many consecutive transient failures.
    ErrorBudgetExhausted { consecutive: u32 },
}

impl StopReason {
    /// Whether the stop was caused by a failure rather than the user.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StopReason::Cancelled)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "monitoring stopped by user"),
            StopReason::Configuration(msg) => write!(f, "configuration error: {msg}"),
            StopReason::ErrorBudgetExhausted { consecutive } => {
                write!(f, "too many consecutive errors ({consecutive}), stopping")
            }
        }
    }
}

/// Decides the next state after each cycle.
#[derive(Debug, Clone)]
pub struct FailurePolicy {
    check_interval: Duration,
    rate_limit_grace: Duration,
    max_consecutive_errors: u32,
    consecutive_errors: u32,
}

impl FailurePolicy {
    pub fn new(check_interval: Duration) -> Self {
        Self {
            check_interval,
            rate_limit_grace: DEFAULT_RATE_LIMIT_GRACE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            consecutive_errors: 0,
        }
    }

    pub fn with_rate_limit_grace(mut self, grace: Duration) -> Self {
        self.rate_limit_grace = grace;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// A reading was classified. Resets the error streak.
    pub fn on_success(&mut self) -> LoopState {
        self.consecutive_errors = 0;
        LoopState::Waiting {
            wait: self.check_interval,
        }
    }

    /// A read failed. Rate limits back off without touching the error streak;
    /// anything else counts against it.
    pub fn on_error(&mut self, error: &ClientError) -> LoopState {
        match error {
            ClientError::RateLimited { wait } => LoopState::Backoff {
                wait: wait.saturating_add(self.rate_limit_grace),
            },
            _ => {
                self.consecutive_errors += 1;
                if self.consecutive_errors >= self.max_consecutive_errors {
                    LoopState::Stopped(StopReason::ErrorBudgetExhausted {
                        consecutive: self.consecutive_errors,
                    })
                } else {
                    LoopState::Retrying {
                        wait: self.check_interval.saturating_mul(2),
                        attempt: self.consecutive_errors,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FailurePolicy {
        FailurePolicy::new(Duration::from_secs(10))
    }

    #[test]
    fn test_success_waits_check_interval() {
        let mut policy = policy();
        assert_eq!(
            policy.on_success(),
            LoopState::Waiting {
                wait: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn test_rate_limit_adds_grace_and_keeps_streak() {
        let mut policy = policy();
        policy.on_error(&ClientError::transient("boom"));
        let next = policy.on_error(&ClientError::rate_limited(30));
        assert_eq!(
            next,
            LoopState::Backoff {
                wait: Duration::from_secs(40)
            }
        );
        assert_eq!(policy.consecutive_errors(), 1);
    }

    #[test]
    fn test_transient_retries_at_double_interval() {
        let mut policy = policy();
        assert_eq!(
            policy.on_error(&ClientError::transient("boom")),
            LoopState::Retrying {
                wait: Duration::from_secs(20),
                attempt: 1
            }
        );
    }

    #[test]
    fn test_fifth_consecutive_error_stops() {
        let mut policy = policy();
        for attempt in 1..5 {
            let next = policy.on_error(&ClientError::transient("boom"));
            assert_eq!(next.sleep(), Some(Duration::from_secs(20)), "attempt {attempt}");
        }
        let next = policy.on_error(&ClientError::transient("boom"));
        assert_eq!(
            next,
            LoopState::Stopped(StopReason::ErrorBudgetExhausted { consecutive: 5 })
        );
    }

    #[test]
    fn test_success_resets_streak() {
        let mut policy = policy();
        for _ in 0..4 {
            policy.on_error(&ClientError::transient("boom"));
        }
        policy.on_success();
        assert_eq!(policy.consecutive_errors(), 0);
        assert!(!policy.on_error(&ClientError::transient("boom")).is_stopped());
    }

    #[test]
    fn test_custom_limits() {
        let mut policy = FailurePolicy::new(Duration::from_secs(3))
            .with_rate_limit_grace(Duration::ZERO)
            .with_max_consecutive_errors(1);
        assert_eq!(
            policy.on_error(&ClientError::rate_limited(7)).sleep(),
            Some(Duration::from_secs(7))
        );
        assert!(policy.on_error(&ClientError::transient("boom")).is_stopped());
    }

    #[test]
    fn test_huge_rate_limit_saturates() {
        let mut policy = policy();
        assert_eq!(
            policy.on_error(&ClientError::rate_limited(u64::MAX)),
            LoopState::Backoff {
                wait: Duration::MAX
            }
        );
        assert_eq!(policy.consecutive_errors(), 0);
    }

    #[test]
    fn test_huge_interval_retry_saturates() {
        let mut policy = FailurePolicy::new(Duration::from_secs(u64::MAX));
        assert_eq!(
            policy.on_error(&ClientError::transient("boom")),
            LoopState::Retrying {
                wait: Duration::MAX,
                attempt: 1
            }
        );
    }

    #[test]
    fn test_stop_reason_display() {
        assert!(!StopReason::Cancelled.is_fatal());
        assert!(StopReason::ErrorBudgetExhausted { consecutive: 5 }.is_fatal());
        assert_eq!(
            StopReason::ErrorBudgetExhausted { consecutive: 5 }.to_string(),
            "too many consecutive errors (5), stopping"
        );
    }
}
