//! Notification bus: publish/subscribe by channel name.
//!
//! The bus decouples the transport layer from the authentication state
//! machine and from UI collaborators. Channels are created lazily on first
//! use; publishing to a channel nobody listens on is a no-op.
//!
//! # Channels
//!
//! | Channel | Traffic |
//! |---------|---------|
//! | [`AUTH_CHANNEL`] | [`Notice::Evaluate`], [`Notice::Logout`] inbound; [`Notice::StateChanged`], [`Notice::LoginFailed`] outbound |
//! | [`DATA_CHANNEL`] | [`Notice::AuthFailed`], [`Notice::Opened`], [`Notice::Unavailable`] from the transport |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::auth::AuthState;

// ============================================================================
// Constants
// ============================================================================

/// Channel carrying authentication lifecycle traffic.
pub const AUTH_CHANNEL: &str = "auth";

/// Channel carrying transport-level notifications.
pub const DATA_CHANNEL: &str = "data";

/// Buffered notices per channel before slow receivers start lagging.
const CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// Notice
// ============================================================================

/// A notification delivered over the bus.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Request to re-check credential availability.
    Evaluate,

    /// Request to log out the current session.
    Logout,

    /// Transport reported rejected credentials.
    AuthFailed {
        /// Reason supplied by the transport.
        reason: String,
    },

    /// Transport connection opened.
    Opened {
        /// `true` when the connection presented credentials.
        authenticated: bool,
    },

    /// Transport exhausted its reconnect attempts.
    Unavailable {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Authentication state changed.
    StateChanged {
        /// The new state.
        state: AuthState,
    },

    /// Interactive login attempt failed.
    LoginFailed {
        /// Server-supplied message for the login UI.
        message: String,
    },
}

// ============================================================================
// NotificationBus
// ============================================================================

/// Publish/subscribe bus keyed by channel name.
///
/// Cheap to clone; clones share the same channels.
#[derive(Debug, Clone, Default)]
pub struct NotificationBus {
    channels: Arc<RwLock<FxHashMap<String, broadcast::Sender<Notice>>>>,
}

impl NotificationBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a notice to a channel.
    ///
    /// Returns the number of receivers the notice was delivered to.
    pub fn publish(&self, channel: &str, notice: Notice) -> usize {
        let sender = {
            let channels = self.channels.read();
            channels.get(channel).cloned()
        };

        let delivered = match sender {
            Some(tx) => tx.send(notice.clone()).unwrap_or(0),
            None => 0,
        };

        trace!(channel, ?notice, delivered, "Notice published");
        delivered
    }

    /// Subscribes to a channel, creating it if needed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Notice> {
        let mut channels = self.channels.write();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns the number of active receivers on a channel.
    #[must_use]
    pub fn receiver_count(&self, channel: &str) -> usize {
        let channels = self.channels.read();
        channels
            .get(channel)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = NotificationBus::new();
        let mut rx = bus.subscribe(AUTH_CHANNEL);

        let delivered = bus.publish(AUTH_CHANNEL, Notice::Evaluate);
        assert_eq!(delivered, 1);

        let notice = rx.recv().await.expect("notice");
        assert_eq!(notice, Notice::Evaluate);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = NotificationBus::new();
        assert_eq!(bus.publish(DATA_CHANNEL, Notice::Logout), 0);
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let bus = NotificationBus::new();
        let mut auth_rx = bus.subscribe(AUTH_CHANNEL);
        let _data_rx = bus.subscribe(DATA_CHANNEL);

        bus.publish(
            DATA_CHANNEL,
            Notice::AuthFailed {
                reason: "kicked".to_string(),
            },
        );

        // Nothing arrived on the auth channel.
        assert!(auth_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clone_shares_channels() {
        let bus = NotificationBus::new();
        let clone = bus.clone();
        let mut rx = bus.subscribe(AUTH_CHANNEL);

        clone.publish(AUTH_CHANNEL, Notice::Logout);
        assert_eq!(rx.recv().await.expect("notice"), Notice::Logout);
    }

    #[test]
    fn test_receiver_count() {
        let bus = NotificationBus::new();
        assert_eq!(bus.receiver_count(AUTH_CHANNEL), 0);

        let _rx = bus.subscribe(AUTH_CHANNEL);
        assert_eq!(bus.receiver_count(AUTH_CHANNEL), 1);
    }
}
