//! Socket pattern tag.
//!
//! Pattern differences are expressed as capability queries on this enum and
//! matched once per operation, rather than through a type hierarchy.

use std::fmt;

/// Messaging patterns.
///
/// Discriminants follow the ZMQ_TYPE numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketType {
    /// PAIR socket for exclusive bidirectional communication
    Pair = 0,

    /// PUB socket for publishing messages to subscribers
    Pub = 1,

    /// SUB socket for subscribing to published messages
    Sub = 2,
}

impl SocketType {
    /// Get the socket type as its wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
        }
    }

    /// Parse a wire name (as carried in the READY `Socket-Type` property).
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"PAIR" => Some(Self::Pair),
            b"PUB" => Some(Self::Pub),
            b"SUB" => Some(Self::Sub),
            _ => None,
        }
    }

    /// Whether `send` is allowed.
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Pair | Self::Pub)
    }

    /// Whether `recv` is allowed.
    pub const fn can_recv(&self) -> bool {
        matches!(self, Self::Pair | Self::Sub)
    }

    /// Whether the socket keeps a subscription filter.
    pub const fn filters(&self) -> bool {
        matches!(self, Self::Sub)
    }

    /// At most one live peer.
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::Pair)
    }

    /// Check if this socket type is compatible with the given peer type.
    pub const fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair) | (Self::Pub, Self::Sub) | (Self::Sub, Self::Pub)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
