//! Connection lifecycle.
//!
//! ```text
//! idle --handshake sent--> awaiting-handshake --handshake ack--> active
//!   ^                                                               |
//!   +------------------- disconnect / close (any state) ------------+
//! ```
//!
//! On the device side "handshake sent" is the transport coming up and "ack" is
//! the companion's connect request being answered. On the companion side the
//! connect request is sent and "ack" is its response.

use std::fmt;
use tracing::{debug, info};

/// Per-connection state owned by the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    AwaitingHandshake,
    Active,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Idle => "idle",
            ConnectionState::AwaitingHandshake => "awaiting-handshake",
            ConnectionState::Active => "active",
        })
    }
}

/// Lifecycle events that drive [`ConnectionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    /// Transport connected and our side of the handshake is underway
    HandshakeSent,
    /// The handshake completed
    HandshakeAck,
    /// Transport failed or was closed
    Disconnected,
}

impl ConnectionState {
    /// Apply `event`, returning the new state.
    ///
    /// An ack completes the handshake from idle as well as from awaiting, since a
    /// companion may connect before the device noticed the transport coming up.
    pub fn on_event(self, event: HandshakeEvent) -> Self {
        let next = match (self, event) {
            (_, HandshakeEvent::Disconnected) => ConnectionState::Idle,
            (ConnectionState::Idle, HandshakeEvent::HandshakeSent) => {
                ConnectionState::AwaitingHandshake
            }
            (ConnectionState::Idle | ConnectionState::AwaitingHandshake, HandshakeEvent::HandshakeAck) => {
                ConnectionState::Active
            }
            (state, _) => state,
        };

        if next != self {
            info!(from = %self, to = %next, "Connection state changed");
        } else {
            debug!(state = %self, ?event, "Connection event ignored");
        }
        next
    }

    pub fn is_active(self) -> bool {
        self == ConnectionState::Active
    }
}
