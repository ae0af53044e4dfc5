//! ZMTP handshake that completes before a connection carries any data.
//!
//! Sequence (both sides run it symmetrically):
//! 1. send our greeting, read the peer's (64 bytes each)
//! 2. send READY with our `Socket-Type`, read the peer's READY
//! 3. check the two socket types are allowed to talk
//!
//! Only after this returns is the stream handed to the dispatcher's
//! connection task.

use crate::codec::{encode_frame, Result, ZmtpError, FLAG_COMMAND, FLAG_LONG};
use crate::command::{build_ready, parse_ready, MAX_READY_SIZE};
use crate::greeting::{ZmtpGreeting, GREETING_SIZE};
use bytes::BytesMut;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use std::time::Duration;
use tandem_core::socket_type::SocketType;
use tracing::debug;

/// Result of a successful handshake
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    pub peer_greeting: ZmtpGreeting,
    pub peer_socket_type: SocketType,
}

async fn read_exactly<S: AsyncRead + Unpin>(stream: &mut S, len: usize) -> Result<Vec<u8>> {
    let BufResult(res, buf) = stream.read_exact(Vec::with_capacity(len)).await;
    res?;
    Ok(buf)
}

async fn write_all<S: AsyncWrite + Unpin>(stream: &mut S, bytes: Vec<u8>) -> Result<()> {
    let BufResult(res, _) = stream.write_all(bytes).await;
    res?;
    Ok(())
}

/// Performs the complete handshake on `stream`.
pub async fn perform_handshake<S>(
    stream: &mut S,
    local: SocketType,
    as_server: bool,
) -> Result<HandshakeResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!("[HANDSHAKE] Starting handshake as {}", local);

    write_all(stream, ZmtpGreeting::encode(as_server).to_vec()).await?;
    let raw = read_exactly(stream, GREETING_SIZE).await?;
    let peer_greeting = ZmtpGreeting::parse(&raw)?;
    debug!(
        "[HANDSHAKE] Peer greeting: ZMTP {}.{}",
        peer_greeting.major, peer_greeting.minor
    );

    let mut ready = BytesMut::new();
    encode_frame(FLAG_COMMAND, &build_ready(local), &mut ready);
    write_all(stream, ready.to_vec()).await?;

    let header = read_exactly(stream, 2).await?;
    let flags = header[0];
    if flags & FLAG_COMMAND == 0 {
        return Err(ZmtpError::Protocol("expected READY command frame"));
    }

    let body_len = if flags & FLAG_LONG != 0 {
        // header[1] is the first byte of the 8-byte size
        let tail = read_exactly(stream, 7).await?;
        let mut size = [0u8; 8];
        size[0] = header[1];
        size[1..].copy_from_slice(&tail);
        u64::from_be_bytes(size) as usize
    } else {
        header[1] as usize
    };

    if body_len > MAX_READY_SIZE {
        return Err(ZmtpError::Protocol("READY command too large"));
    }

    let body = read_exactly(stream, body_len).await?;
    let peer_socket_type = parse_ready(&body)?;

    if !local.is_compatible(peer_socket_type) {
        return Err(ZmtpError::IncompatiblePeer {
            local: local.to_string(),
            peer: peer_socket_type.to_string(),
        });
    }

    debug!("[HANDSHAKE] Handshake complete, peer is {}", peer_socket_type);

    Ok(HandshakeResult {
        peer_greeting,
        peer_socket_type,
    })
}

/// [`perform_handshake`] bounded by `timeout` (`Duration::ZERO` = no bound).
pub async fn perform_handshake_with_timeout<S>(
    stream: &mut S,
    local: SocketType,
    as_server: bool,
    timeout: Duration,
) -> Result<HandshakeResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if timeout.is_zero() {
        return perform_handshake(stream, local, as_server).await;
    }
    compio::time::timeout(timeout, perform_handshake(stream, local, as_server))
        .await
        .map_err(|_| ZmtpError::Timeout)?
}
