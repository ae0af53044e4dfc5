//! Socket configuration options
//!
//! This module provides configuration options for sockets, similar to
//! libzmq's socket options (zmq_setsockopt/zmq_getsockopt), plus the
//! per-call [`Flags`].

use bytes::Bytes;
use std::time::Duration;

/// Socket configuration options.
///
/// These options control queue capacity, blocking behavior and the TCP
/// handshake.
///
/// # Examples
///
/// ```
/// use tandem_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_recv_timeout(Duration::from_secs(5))
///     .with_send_hwm(10);
/// assert_eq!(opts.send_hwm, 10);
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// High water mark for sending (ZMQ_SNDHWM)
    ///
    /// Maximum number of messages queued per connection on the outbound side.
    /// PAIR blocks when reached, PUB drops.
    /// - Default: 1000 messages
    /// - `0`: unbounded
    pub send_hwm: usize,

    /// High water mark for receiving (ZMQ_RCVHWM)
    ///
    /// Maximum number of messages queued per connection on the inbound side.
    /// - Default: 1000 messages
    /// - `0`: unbounded
    pub recv_hwm: usize,

    /// Receive timeout (ZMQ_RCVTIMEO)
    ///
    /// - `None`: Block indefinitely (default)
    /// - `Some(Duration::ZERO)`: Non-blocking
    /// - `Some(duration)`: Wait up to duration before returning `WouldBlock`
    pub recv_timeout: Option<Duration>,

    /// Send timeout (ZMQ_SNDTIMEO)
    ///
    /// Same semantics as `recv_timeout`.
    pub send_timeout: Option<Duration>,

    /// Handshake timeout (ZMQ_HANDSHAKE_IVL)
    ///
    /// Maximum time to complete the TCP handshake after connection.
    /// - Default: 30 seconds
    /// - `Duration::ZERO` disables the timeout
    pub handshake_timeout: Duration,

    /// Read buffer size (bytes) used by the dispatcher per TCP connection.
    /// - Default: 8192 (8KB)
    pub read_buffer_size: usize,

    /// Largest inbound TCP message accepted (ZMQ_MAXMSGSIZE)
    ///
    /// A peer announcing a bigger frame is disconnected before its body is
    /// buffered.
    /// - `None`: no limit (default)
    pub max_msg_size: Option<u64>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            send_hwm: 1000,
            recv_hwm: 1000,
            recv_timeout: None, // Block indefinitely
            send_timeout: None, // Block indefinitely
            handshake_timeout: Duration::from_secs(30),
            read_buffer_size: 8192,
            max_msg_size: None,
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the send high water mark.
    pub fn with_send_hwm(mut self, hwm: usize) -> Self {
        self.send_hwm = hwm;
        self
    }

    /// Set the receive high water mark.
    pub fn with_recv_hwm(mut self, hwm: usize) -> Self {
        self.recv_hwm = hwm;
        self
    }

    /// Set receive timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use tandem_core::options::SocketOptions;
    /// use std::time::Duration;
    ///
    /// // Non-blocking receive
    /// let opts = SocketOptions::new().with_recv_timeout(Duration::ZERO);
    /// assert_eq!(opts.recv_timeout, Some(Duration::ZERO));
    /// ```
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = Some(timeout);
        self
    }

    /// Set send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Set handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the dispatcher read buffer size.
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(64);
        self
    }

    /// Set the largest inbound message size.
    pub fn with_max_msg_size(mut self, size: u64) -> Self {
        self.max_msg_size = Some(size);
        self
    }

    /// Apply a single runtime option.
    ///
    /// Subscription options are not stored here; they are handled by the
    /// socket's subscription set. Returns `false` for those.
    pub fn apply(&mut self, option: &SocketOption) -> bool {
        match option {
            SocketOption::SendHwm(hwm) => self.send_hwm = *hwm,
            SocketOption::RecvHwm(hwm) => self.recv_hwm = *hwm,
            SocketOption::SendTimeout(t) => self.send_timeout = *t,
            SocketOption::RecvTimeout(t) => self.recv_timeout = *t,
            SocketOption::MaxMsgSize(size) => self.max_msg_size = *size,
            SocketOption::Subscribe(_) | SocketOption::Unsubscribe(_) => return false,
        }
        true
    }
}

/// Runtime option for `set_option` (zmq_setsockopt).
///
/// HWM changes apply to connections created afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketOption {
    /// ZMQ_SUBSCRIBE: add a topic prefix (SUB only)
    Subscribe(Bytes),
    /// ZMQ_UNSUBSCRIBE: remove a topic prefix (SUB only)
    Unsubscribe(Bytes),
    /// ZMQ_SNDHWM
    SendHwm(usize),
    /// ZMQ_RCVHWM
    RecvHwm(usize),
    /// ZMQ_SNDTIMEO (`None` blocks forever)
    SendTimeout(Option<Duration>),
    /// ZMQ_RCVTIMEO (`None` blocks forever)
    RecvTimeout(Option<Duration>),
    /// ZMQ_MAXMSGSIZE (`None` is unlimited); applies to new connections
    MaxMsgSize(Option<u64>),
}

impl SocketOption {
    /// Create a subscribe option from anything byte-like.
    pub fn subscribe(prefix: impl AsRef<[u8]>) -> Self {
        Self::Subscribe(Bytes::copy_from_slice(prefix.as_ref()))
    }

    /// Create an unsubscribe option from anything byte-like.
    pub fn unsubscribe(prefix: impl AsRef<[u8]>) -> Self {
        Self::Unsubscribe(Bytes::copy_from_slice(prefix.as_ref()))
    }

    /// Option name, for errors and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "SUBSCRIBE",
            Self::Unsubscribe(_) => "UNSUBSCRIBE",
            Self::SendHwm(_) => "SNDHWM",
            Self::RecvHwm(_) => "RCVHWM",
            Self::SendTimeout(_) => "SNDTIMEO",
            Self::RecvTimeout(_) => "RCVTIMEO",
            Self::MaxMsgSize(_) => "MAXMSGSIZE",
        }
    }
}

/// Per-call flags for `send`/`recv`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    dontwait: bool,
}

impl Flags {
    /// Blocking call (default).
    pub const NONE: Self = Self { dontwait: false };

    /// ZMQ_DONTWAIT / NOBLOCK: fail with `WouldBlock` instead of suspending.
    pub const DONTWAIT: Self = Self { dontwait: true };

    /// Whether the non-blocking bit is set.
    #[inline]
    pub const fn is_nonblocking(&self) -> bool {
        self.dontwait
    }
}
