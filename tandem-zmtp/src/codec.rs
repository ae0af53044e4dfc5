//! ZMTP frame codec.
//!
//! One message travels as one data frame:
//!
//! ```text
//! [flags:1] [size:1 | size:8 BE] [body:size]
//! ```
//!
//! Flags: bit 0 MORE, bit 1 LONG (8-byte size), bit 2 COMMAND. Messages are
//! single-part, so MORE is never produced; a peer sending it is reported as
//! a protocol violation.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tandem_core::message::Message;
use thiserror::Error;

pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_LONG: u8 = 0x02;
pub const FLAG_COMMAND: u8 = 0x04;

/// ZMTP protocol errors
#[derive(Debug, Error)]
pub enum ZmtpError {
    #[error("Protocol violation: reserved bits set")]
    ReservedBits,

    #[error("Protocol violation: frame size too large ({0} bytes)")]
    SizeTooLarge(u64),

    #[error("Multipart messages are not supported")]
    Multipart,

    #[error("Protocol violation: {0}")]
    Protocol(&'static str),

    #[error("Incompatible peer socket type {peer} for {local}")]
    IncompatiblePeer { local: String, peer: String },

    #[error("Handshake timed out")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ZMTP operations
pub type Result<T> = std::result::Result<T, ZmtpError>;

/// A decoded ZMTP frame
#[derive(Debug, Clone)]
pub struct ZmtpFrame {
    pub flags: u8,
    pub payload: Bytes,
}

impl ZmtpFrame {
    #[inline]
    pub const fn more(&self) -> bool {
        (self.flags & FLAG_MORE) != 0
    }

    #[inline]
    pub const fn is_command(&self) -> bool {
        (self.flags & FLAG_COMMAND) != 0
    }
}

/// Stateful ZMTP decoder
///
/// Fast path:
/// - Entire frame present → zero-copy slice
///
/// Slow path:
/// - Fragmented body → reassemble into `BytesMut`
///
/// Incomplete headers are left in `src` untouched; the caller keeps them and
/// appends the next read.
#[derive(Debug)]
pub struct ZmtpDecoder {
    pending_flags: Option<u8>,
    expected_body_len: usize,
    staging: BytesMut,
    max_body_len: u64,
}

impl Default for ZmtpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ZmtpDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_body(0x7FFF_FFFF_FFFF_FFFF)
    }

    /// Decoder that rejects frames larger than `max_body_len`.
    #[must_use]
    pub fn with_max_body(max_body_len: u64) -> Self {
        Self {
            pending_flags: None,
            expected_body_len: 0,
            staging: BytesMut::new(),
            max_body_len,
        }
    }

    /// Decode a single frame from `src`
    ///
    /// Returns:
    /// - Ok(Some(frame)) → frame decoded
    /// - Ok(None) → need more data
    /// - Err → protocol violation
    pub fn decode(&mut self, src: &mut Bytes) -> Result<Option<ZmtpFrame>> {
        // === Reassembly mode ===
        if let Some(flags) = self.pending_flags {
            let needed = self.expected_body_len - self.staging.len();
            let take = needed.min(src.len());

            self.staging.extend_from_slice(&src.split_to(take));

            if self.staging.len() < self.expected_body_len {
                return Ok(None);
            }

            let payload = self.staging.split().freeze();
            self.pending_flags = None;
            self.expected_body_len = 0;

            return Ok(Some(ZmtpFrame { flags, payload }));
        }

        // === Header parsing ===
        if src.len() < 2 {
            return Ok(None);
        }

        let flags = src[0];

        // Reserved bits must be zero (bits 3–7)
        if (flags & 0xF8) != 0 {
            return Err(ZmtpError::ReservedBits);
        }

        let is_long = (flags & FLAG_LONG) != 0;
        let header_len = if is_long { 9 } else { 2 };

        if src.len() < header_len {
            return Ok(None);
        }

        let body_len = if is_long {
            let mut buf = &src[1..9];
            buf.get_u64()
        } else {
            u64::from(src[1])
        };

        if body_len > self.max_body_len {
            return Err(ZmtpError::SizeTooLarge(body_len));
        }
        let body_len = body_len as usize;

        // === Fast path: entire frame present ===
        if src.len() >= header_len + body_len {
            src.advance(header_len);
            let payload = src.split_to(body_len);
            return Ok(Some(ZmtpFrame { flags, payload }));
        }

        // === Slow path: fragmentation ===
        src.advance(header_len);
        self.pending_flags = Some(flags);
        self.expected_body_len = body_len;
        self.staging.clear();
        self.staging.reserve(body_len.min(64 * 1024));
        self.staging.extend_from_slice(&src.split_to(src.len()));

        Ok(None)
    }

    /// Decode the next *message*, skipping command frames (PING etc.).
    pub fn decode_message(&mut self, src: &mut Bytes) -> Result<Option<Message>> {
        while let Some(frame) = self.decode(src)? {
            if frame.is_command() {
                continue;
            }
            if frame.more() {
                return Err(ZmtpError::Multipart);
            }
            return Ok(Some(Message::from(frame.payload)));
        }
        Ok(None)
    }
}

/// Append a frame header + body to `out`.
pub fn encode_frame(flags: u8, body: &[u8], out: &mut BytesMut) {
    let len = body.len();
    if len <= 255 {
        out.reserve(2 + len);
        out.put_u8(flags & !FLAG_LONG);
        out.put_u8(len as u8);
    } else {
        out.reserve(9 + len);
        out.put_u8(flags | FLAG_LONG);
        out.put_u64(len as u64);
    }
    out.extend_from_slice(body);
}

/// Append a message as a single data frame.
#[inline]
pub fn encode_message(msg: &Message, out: &mut BytesMut) {
    encode_frame(0, msg.as_bytes(), out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(msg: &Message) -> Bytes {
        let mut out = BytesMut::new();
        encode_message(msg, &mut out);
        out.freeze()
    }

    #[test]
    fn short_frame_layout() {
        let bytes = encoded(&Message::from("hi"));
        assert_eq!(&bytes[..], &[0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn long_frame_layout() {
        let bytes = encoded(&Message::from(vec![b'X'; 300]));
        assert_eq!(bytes[0], FLAG_LONG);
        assert_eq!(&bytes[1..9], &300u64.to_be_bytes());
        assert_eq!(bytes.len(), 9 + 300);
    }

    #[test]
    fn decodes_back_to_back_messages() {
        let mut wire = BytesMut::new();
        for i in 0..5 {
            encode_message(&Message::from(vec![b'X'; i * 100]), &mut wire);
        }
        let mut src = wire.freeze();
        let mut decoder = ZmtpDecoder::new();
        for i in 0..5 {
            let msg = decoder.decode_message(&mut src).unwrap().unwrap();
            assert_eq!(msg.len(), i * 100);
        }
        assert!(decoder.decode_message(&mut src).unwrap().is_none());
        assert!(src.is_empty());
    }

    #[test]
    fn reassembles_fragmented_body() {
        let wire = encoded(&Message::from(vec![b'Y'; 1000]));
        let mut decoder = ZmtpDecoder::new();

        let mut first = wire.slice(..400);
        assert!(decoder.decode_message(&mut first).unwrap().is_none());
        assert!(first.is_empty());

        let mut rest = wire.slice(400..);
        let msg = decoder.decode_message(&mut rest).unwrap().unwrap();
        assert_eq!(msg, Message::from(vec![b'Y'; 1000]));
    }

    #[test]
    fn partial_header_is_left_in_place() {
        let wire = encoded(&Message::from(vec![b'Z'; 300]));
        let mut decoder = ZmtpDecoder::new();
        let mut head = wire.slice(..5);
        assert!(decoder.decode(&mut head).unwrap().is_none());
        assert_eq!(head.len(), 5);
    }

    #[test]
    fn empty_message_survives() {
        let mut src = encoded(&Message::empty());
        let msg = ZmtpDecoder::new().decode_message(&mut src).unwrap().unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn commands_are_skipped() {
        let mut wire = BytesMut::new();
        encode_frame(FLAG_COMMAND, b"\x04PING", &mut wire);
        encode_message(&Message::from("data"), &mut wire);
        let mut src = wire.freeze();
        let msg = ZmtpDecoder::new().decode_message(&mut src).unwrap().unwrap();
        assert_eq!(msg, "data");
    }

    #[test]
    fn protocol_violations() {
        let mut reserved = Bytes::from_static(&[0x08, 0x00]);
        assert!(matches!(
            ZmtpDecoder::new().decode(&mut reserved),
            Err(ZmtpError::ReservedBits)
        ));

        let mut more = Bytes::from_static(&[FLAG_MORE, 0x01, b'a']);
        assert!(matches!(
            ZmtpDecoder::new().decode_message(&mut more),
            Err(ZmtpError::Multipart)
        ));

        let mut big = Bytes::from_static(&[0x00, 0x10]);
        assert!(matches!(
            ZmtpDecoder::with_max_body(8).decode(&mut big),
            Err(ZmtpError::SizeTooLarge(16))
        ));
    }
}
