//! READY command (ZMTP/37) encoding and parsing.
//!
//! Grammar of the command body:
//! - 1 byte: command name length
//! - command name ("READY")
//! - repeated properties:
//!   - 1 byte: property name length
//!   - property name
//!   - 4 bytes: value length (BE)
//!   - value

use crate::codec::{Result, ZmtpError};
use bytes::{BufMut, BytesMut};
use tandem_core::socket_type::SocketType;

/// Upper bound for a READY body we are willing to read.
pub const MAX_READY_SIZE: usize = 512;

/// Build a READY command body announcing `socket_type`.
pub fn build_ready(socket_type: SocketType) -> BytesMut {
    let name = socket_type.as_str().as_bytes();
    let mut body = BytesMut::with_capacity(6 + 12 + 4 + name.len());

    body.put_u8(5);
    body.extend_from_slice(b"READY");

    body.put_u8(11);
    body.extend_from_slice(b"Socket-Type");
    body.put_u32(name.len() as u32);
    body.extend_from_slice(name);

    body
}

/// Parse a READY command body and return the peer's socket type.
///
/// Unknown properties (e.g. `Identity`) are skipped.
pub fn parse_ready(body: &[u8]) -> Result<SocketType> {
    let truncated = || ZmtpError::Protocol("truncated READY command");

    let (&name_len, rest) = body.split_first().ok_or_else(truncated)?;
    let name_len = name_len as usize;
    if rest.len() < name_len || &rest[..name_len] != b"READY" {
        return Err(ZmtpError::Protocol("expected READY command"));
    }

    let mut rest = &rest[name_len..];
    let mut socket_type = None;

    while let Some((&key_len, tail)) = rest.split_first() {
        let key_len = key_len as usize;
        if tail.len() < key_len + 4 {
            return Err(truncated());
        }
        let (key, tail) = tail.split_at(key_len);
        let (len_bytes, tail) = tail.split_at(4);
        let value_len =
            u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if tail.len() < value_len {
            return Err(truncated());
        }
        let (value, tail) = tail.split_at(value_len);

        if key.eq_ignore_ascii_case(b"Socket-Type") {
            socket_type = Some(
                SocketType::from_name(value)
                    .ok_or(ZmtpError::Protocol("unsupported peer socket type"))?,
            );
        }
        rest = tail;
    }

    socket_type.ok_or(ZmtpError::Protocol("READY without Socket-Type"))
}
