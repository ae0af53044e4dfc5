//! # Tandem
//!
//! PAIR and PUB/SUB messaging sockets with ZeroMQ semantics.
//!
//! ## Architecture
//!
//! - **`tandem-core`**: messages, endpoints, per-connection queues,
//!   subscription filtering (no I/O)
//! - **`tandem-zmtp`**: ZMTP 3.0 framing and handshake for `tcp://`
//! - **`tandem`**: contexts, sockets and the background dispatcher (this crate)
//!
//! Application threads call blocking `send`/`recv` on a [`Socket`]. Those
//! calls only touch in-memory queues; a per-[`Context`] dispatcher thread
//! running a compio runtime moves bytes between queues and TCP streams.
//! `inproc://` connections skip the dispatcher entirely.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tandem::prelude::*;
//!
//! # fn main() -> tandem::Result<()> {
//! let ctx = Context::new();
//!
//! let publisher = ctx.socket(SocketType::Pub)?;
//! publisher.bind("inproc://ticker")?;
//!
//! let subscriber = ctx.socket(SocketType::Sub)?;
//! subscriber.subscribe("AAPL")?;
//! subscriber.connect("inproc://ticker")?;
//!
//! publisher.send("AAPL 191.2", Flags::NONE)?;
//! publisher.send("MSFT 402.7", Flags::NONE)?;
//!
//! assert_eq!(subscriber.recv(Flags::NONE)?, "AAPL 191.2");
//! # Ok(())
//! # }
//! ```
//!
//! ## Patterns
//!
//! | Pattern | Peers      | send                       | recv                        |
//! |---------|------------|----------------------------|-----------------------------|
//! | PAIR    | exactly 1  | blocks at high-water mark  | FIFO from the peer          |
//! | PUB     | any        | fan-out, drops at HWM      | not supported               |
//! | SUB     | any        | not supported              | prefix-filtered, fair-queued|

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod context;
mod dispatcher;
mod pattern;
mod socket;
mod tcp;

pub use context::Context;
pub use socket::Socket;

pub use bytes::Bytes;
pub use tandem_core::endpoint::{Endpoint, EndpointError};
pub use tandem_core::error::{Result, SocketError};
pub use tandem_core::message::Message;
pub use tandem_core::monitor::{SocketEvent, SocketMonitor};
pub use tandem_core::options::{Flags, SocketOption, SocketOptions};
pub use tandem_core::socket_type::SocketType;

/// Everything needed to open and use sockets.
pub mod prelude {
    pub use crate::{
        Context, Endpoint, EndpointError, Flags, Message, Socket, SocketError, SocketEvent,
        SocketOption, SocketOptions, SocketType,
    };
}
