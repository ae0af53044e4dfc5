//! Handshake and framing over real loopback TCP streams.

use bytes::{Bytes, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncReadExt, AsyncWriteExt};
use compio::net::{TcpListener, TcpStream};
use std::time::Duration;
use tandem_core::message::Message;
use tandem_core::socket_type::SocketType;
use tandem_zmtp::codec::{encode_message, ZmtpDecoder, ZmtpError};
use tandem_zmtp::handshake::{perform_handshake, perform_handshake_with_timeout};

async fn listener() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

#[compio::test]
async fn pub_and_sub_agree() {
    let (listener, addr) = listener().await;
    let (done_tx, done_rx) = flume::bounded(1);

    let server = compio::runtime::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let result = perform_handshake(&mut stream, SocketType::Pub, true).await;
        done_tx
            .send_async(result.map(|r| r.peer_socket_type))
            .await
            .unwrap();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let result = perform_handshake(&mut client, SocketType::Sub, false)
        .await
        .unwrap();
    assert_eq!(result.peer_socket_type, SocketType::Pub);
    assert_eq!(result.peer_greeting.major, 3);

    let _ = server.await;
    let server_saw = done_rx.recv_async().await.unwrap().unwrap();
    assert_eq!(server_saw, SocketType::Sub);
}

#[compio::test]
async fn incompatible_types_are_refused() {
    let (listener, addr) = listener().await;

    let server = compio::runtime::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = perform_handshake(&mut stream, SocketType::Pair, true).await;
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let err = perform_handshake(&mut client, SocketType::Sub, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ZmtpError::IncompatiblePeer { .. }));

    let _ = server.await;
}

#[compio::test]
async fn silent_peer_times_out() {
    let (listener, addr) = listener().await;

    // Accepts but never speaks.
    let server = compio::runtime::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        compio::time::sleep(Duration::from_millis(500)).await;
        drop(stream);
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let err = perform_handshake_with_timeout(
        &mut client,
        SocketType::Pair,
        false,
        Duration::from_millis(50),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ZmtpError::Timeout));

    let _ = server.await;
}

#[compio::test]
async fn messages_survive_the_wire() {
    let (listener, addr) = listener().await;
    let payloads: Vec<Vec<u8>> = vec![b"".to_vec(), b"hello".to_vec(), vec![7u8; 1000]];
    let expected = payloads.clone();

    let server = compio::runtime::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        perform_handshake(&mut stream, SocketType::Pair, true)
            .await
            .unwrap();

        let mut out = BytesMut::new();
        for p in payloads {
            encode_message(&Message::new(p), &mut out);
        }
        let BufResult(res, _) = stream.write_all(out.to_vec()).await;
        res.unwrap();
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    perform_handshake(&mut client, SocketType::Pair, false)
        .await
        .unwrap();

    let total: usize = expected.iter().map(|p| (if p.len() > 255 { 9 } else { 2 }) + p.len()).sum();
    let BufResult(res, raw) = client.read_exact(Vec::with_capacity(total)).await;
    res.unwrap();

    let mut src = Bytes::from(raw);
    let mut decoder = ZmtpDecoder::new();
    for want in expected {
        let msg = decoder.decode_message(&mut src).unwrap().unwrap();
        assert_eq!(msg.as_bytes(), &want[..]);
    }
    assert!(src.is_empty());

    let _ = server.await;
}
