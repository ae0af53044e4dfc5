//! Socket event monitoring.
//!
//! Sockets report connection lifecycle changes to an optional monitor
//! channel. Reporting never blocks the socket: events are dropped if nobody
//! is listening.

use crate::endpoint::Endpoint;
use std::fmt;

/// Socket lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Socket bound to an endpoint (resolved address).
    Bound(Endpoint),

    /// TCP listener is accepting connections.
    Listening(Endpoint),

    /// Outgoing connection established and attached.
    Connected(Endpoint),

    /// Incoming connection accepted and attached.
    Accepted(Endpoint),

    /// A connection was torn down.
    Disconnected(Endpoint),

    /// An incoming connection was refused (PAIR already has a peer).
    Rejected(Endpoint),

    /// Handshake with a TCP peer failed.
    HandshakeFailed { endpoint: Endpoint, reason: String },

    /// The socket was closed.
    Closed,
}

impl fmt::Display for SocketEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound(ep) => write!(f, "Bound to {ep}"),
            Self::Listening(ep) => write!(f, "Listening on {ep}"),
            Self::Connected(ep) => write!(f, "Connected to {ep}"),
            Self::Accepted(ep) => write!(f, "Accepted connection from {ep}"),
            Self::Disconnected(ep) => write!(f, "Disconnected from {ep}"),
            Self::Rejected(ep) => write!(f, "Rejected connection from {ep}"),
            Self::HandshakeFailed { endpoint, reason } => {
                write!(f, "Handshake failed for {endpoint}: {reason}")
            }
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Handle for receiving socket events.
pub type SocketMonitor = flume::Receiver<SocketEvent>;

/// Sender half used by sockets to emit events.
pub type SocketEventSender = flume::Sender<SocketEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (SocketEventSender, SocketMonitor) {
    flume::unbounded()
}
