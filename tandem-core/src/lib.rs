//! Tandem Core
//!
//! This crate contains the transport-agnostic building blocks:
//! - Immutable message payloads (`message`)
//! - Endpoint parsing for `tcp://` and `inproc://` (`endpoint`)
//! - Bounded per-connection queue pairs (`queue`)
//! - SUB-side subscription set (`subscription`)
//! - PUB-side peer subscription index (`index`)
//! - Socket types, options and lifecycle events
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod endpoint;
pub mod error;
pub mod index;
pub mod message;
pub mod monitor;
pub mod options;
pub mod queue;
pub mod socket_type;
pub mod subscription;

