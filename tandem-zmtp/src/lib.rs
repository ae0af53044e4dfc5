//! # Tandem ZMTP
//!
//! Wire layer used by the dispatcher for `tcp://` connections:
//! - single-frame message codec (`codec`)
//! - ZMTP 3.0 greeting and READY command (`greeting`, `command`)
//! - async handshake over any compio stream (`handshake`)
//!
//! Subscription changes travel as ordinary messages (`0x01|prefix`,
//! `0x00|prefix`), as in ZMTP 3.0, so the codec does not special-case them.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod command;
pub mod greeting;
pub mod handshake;

pub use codec::{encode_message, ZmtpDecoder, ZmtpError, ZmtpFrame};
pub use handshake::{perform_handshake, perform_handshake_with_timeout, HandshakeResult};
