//! Edge-triggered transition tracking.
//!
//! The tracker remembers the last state that was reported and answers whether a
//! new observation is worth reporting. Repeated identical readings are
//! swallowed; an offline reading whose last-seen advanced counts as new.

use crate::core::presence::{PresenceKind, PresenceState};

/// Held state for one monitoring session.
#[derive(Debug, Default, Clone)]
pub struct TransitionTracker {
    last_emitted: Option<PresenceKind>,
    last_seen_label: Option<String>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true iff `state` is a reportable transition.
    ///
    /// Held state is only updated when the answer is true.
    pub fn observe(&mut self, state: &PresenceState) -> bool {
        let kind = state.kind();
        let reportable = match state {
            PresenceState::OfflineKnown { .. } => {
                self.last_emitted != Some(kind) || self.last_seen_label != state.last_seen_label()
            }
            _ => self.last_emitted != Some(kind),
        };

        if reportable {
            self.last_emitted = Some(kind);
            if let Some(label) = state.last_seen_label() {
                self.last_seen_label = Some(label);
            }
        }
        reportable
    }

    /// Kind of the last reported state, if any.
    pub fn last_emitted(&self) -> Option<PresenceKind> {
        self.last_emitted
    }

    pub fn last_seen_label(&self) -> Option<&str> {
        self.last_seen_label.as_deref()
    }
}
