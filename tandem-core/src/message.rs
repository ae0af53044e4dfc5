//! Immutable message payloads.
//!
//! A [`Message`] is a single refcounted byte payload. Cloning is cheap (the
//! underlying `Bytes` is shared), which is what lets PUB fan-out hand the same
//! payload to every subscriber queue without copying.

use crate::error::Result;
use bytes::Bytes;
use std::fmt;

/// An immutable message.
///
/// Two messages are equal iff their payload bytes are identical.
///
/// # Examples
///
/// ```
/// use tandem_core::message::Message;
///
/// let a = Message::from("blabla");
/// let b = Message::from(b"blabla".to_vec());
/// assert_eq!(a, b);
/// assert_eq!(a.to_text().unwrap(), "blabla");
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    /// Create a message from any byte payload (empty is allowed).
    #[must_use]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Create an empty message.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            payload: Bytes::new(),
        }
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Borrow the payload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Shared handle to the payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// View the payload as text.
    ///
    /// # Errors
    ///
    /// Returns [`SocketError::Encoding`](crate::error::SocketError::Encoding)
    /// if the payload is not valid UTF-8.
    pub fn to_text(&self) -> Result<&str> {
        Ok(std::str::from_utf8(&self.payload)?)
    }
}

impl From<Bytes> for Message {
    fn from(payload: Bytes) -> Self {
        Self { payload }
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Self::new(payload)
    }
}

impl From<&[u8]> for Message {
    fn from(payload: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(payload))
    }
}

impl<const N: usize> From<&[u8; N]> for Message {
    fn from(payload: &[u8; N]) -> Self {
        Self::new(Bytes::copy_from_slice(payload))
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::new(text.into_bytes())
    }
}

impl From<Message> for Bytes {
    fn from(msg: Message) -> Self {
        msg.payload
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl PartialEq<[u8]> for Message {
    fn eq(&self, other: &[u8]) -> bool {
        self.payload == other
    }
}

impl PartialEq<&str> for Message {
    fn eq(&self, other: &&str) -> bool {
        self.payload == other.as_bytes()
    }
}

/// Lossy text rendering, for logs and display only.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.payload))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message").field(&self.payload).finish()
    }
}
