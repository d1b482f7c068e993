//! Core decision logic for the presence monitor.
//!
//! This module contains:
//! - Classification of raw readings into presence states
//! - Edge-triggered transition tracking
//! - The polling loop's failure policy

pub mod policy;
pub mod presence;
pub mod tracker;

// Re-export commonly used types
pub use policy::{FailurePolicy, LoopState, StopReason};
pub use presence::{classify, PresenceKind, PresenceState, TIMESTAMP_FORMAT};
pub use tracker::TransitionTracker;
