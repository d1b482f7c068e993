//! Messaging client seam.
//!
//! The monitor never talks to the messaging service directly. Session setup,
//! entity resolution and the wire protocol live behind [`PresenceClient`].

pub mod replay;
pub mod types;

#[cfg(feature = "bridge")]
pub mod bridge;

use async_trait::async_trait;

use crate::error::ClientError;

pub use replay::ReplayClient;
pub use types::{ContactHandle, RawPresence};

#[cfg(feature = "bridge")]
pub use bridge::{BridgeClient, BridgeConfig};

/// Operations the monitor needs from a messaging client.
#[async_trait]
pub trait PresenceClient: Send {
    /// Establish (or restore) the session.
    async fn connect(&mut self) -> Result<(), ClientError>;

    /// Resolve the configured identifier to a contact handle.
    async fn resolve_contact(&mut self, identifier: &str) -> Result<ContactHandle, ClientError>;

    /// Read the contact's current presence.
    async fn get_presence(&mut self, contact: &ContactHandle) -> Result<RawPresence, ClientError>;

    /// Close the session. Called once when monitoring stops.
    async fn disconnect(&mut self);
}
