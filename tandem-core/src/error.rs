//! Tandem error types
//!
//! Every failure a socket operation can report is a variant of [`SocketError`].
//! Transient conditions (`WouldBlock`) are kept distinct from terminal ones
//! (`ConnectionClosed`) so callers can poll or multiplex on them.

use crate::endpoint::EndpointError;
use crate::socket_type::SocketType;
use std::io;
use thiserror::Error;

/// Main error type for socket operations
#[derive(Error, Debug)]
pub enum SocketError {
    /// Non-blocking operation had no data or capacity available right now.
    ///
    /// Also returned when a configured send/receive timeout elapses.
    #[error("Resource temporarily unavailable")]
    WouldBlock,

    /// Peer torn down, or this socket closed, while an operation was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// Bind or connect failed. The socket itself stays usable.
    #[error("Address error: {0}")]
    Address(#[from] EndpointError),

    /// Payload is not valid UTF-8 text
    #[error("Payload is not valid text: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Operation not available for this socket pattern
    #[error("{op} is not supported on {socket_type} sockets")]
    NotSupported {
        op: &'static str,
        socket_type: SocketType,
    },

    /// Option not recognized for this socket pattern
    #[error("Option {option} is not valid on {socket_type} sockets")]
    InvalidOption {
        option: &'static str,
        socket_type: SocketType,
    },

    /// PAIR socket already has a live peer
    #[error("PAIR socket already has a connected peer")]
    PeerExists,

    /// The owning context has been terminated
    #[error("Context terminated")]
    Terminated,

    /// IO error reported by the dispatcher
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for socket operations
pub type Result<T> = std::result::Result<T, SocketError>;

impl SocketError {
    /// Create a not-supported error for `op` on `socket_type`
    pub const fn not_supported(op: &'static str, socket_type: SocketType) -> Self {
        Self::NotSupported { op, socket_type }
    }

    /// Check if retrying the same call later can succeed
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_recoverable() {
        assert!(SocketError::WouldBlock.is_recoverable());
        assert!(!SocketError::ConnectionClosed.is_recoverable());
        assert!(!SocketError::PeerExists.is_recoverable());
    }

    #[test]
    fn display_names_the_pattern() {
        let err = SocketError::not_supported("recv", SocketType::Pub);
        assert_eq!(err.to_string(), "recv is not supported on PUB sockets");
    }

    #[test]
    fn endpoint_errors_convert() {
        let err: SocketError = EndpointError::InvalidScheme("udp://x".into()).into();
        assert!(matches!(err, SocketError::Address(_)));
    }
}
