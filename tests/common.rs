//! Shared helpers for driving scripted in-process servers.

#![expect(clippy::unwrap_used, reason = "test code can panic")]
#![allow(dead_code, reason = "each integration test uses a subset of helpers")]

use mxc::{
    config::ClientConfig,
    field_id::FieldId,
    protocol,
    transaction::{FrameHeader, HEADER_LEN, Transaction, encode_params},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

/// Configuration with deadlines short enough for tests.
pub fn test_config() -> ClientConfig {
    ClientConfig {
        reply_timeout_seconds: 2,
        handshake_timeout_seconds: 2,
        progress_emit_hz: 1000,
        ..ClientConfig::default()
    }
}

/// Bind a scripted server on an ephemeral local port.
pub async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Accept a control connection and complete the magic exchange.
pub async fn accept_control(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut magic = [0u8; protocol::HANDSHAKE_LEN];
    stream.read_exact(&mut magic).await.unwrap();
    assert_eq!(&magic[0..4], b"TRTP");
    assert_eq!(&magic[4..8], b"HOTL");
    stream.write_all(b"TRTP\x00\x00\x00\x00").await.unwrap();
    stream
}

/// Read one single-frame transaction off the wire.
pub async fn read_tx(stream: &mut TcpStream) -> Transaction {
    let mut header_buf = [0u8; HEADER_LEN];
    stream.read_exact(&mut header_buf).await.unwrap();
    let header = FrameHeader::from_bytes(&header_buf);
    let mut payload = vec![0u8; header.data_size as usize];
    stream.read_exact(&mut payload).await.unwrap();
    Transaction { header, payload }
}

/// Write a reply mirroring `req` with the given error code and fields.
pub async fn write_reply(
    stream: &mut TcpStream,
    req: &FrameHeader,
    error: u32,
    fields: &[(FieldId, Vec<u8>)],
) {
    let payload = if fields.is_empty() {
        Vec::new()
    } else {
        encode_params(fields).unwrap()
    };
    let size = payload.len() as u32;
    let header = FrameHeader {
        flags: 0,
        is_reply: 1,
        ty: req.ty,
        id: req.id,
        error,
        total_size: size,
        data_size: size,
    };
    let tx = Transaction { header, payload };
    stream.write_all(&tx.to_bytes()).await.unwrap();
}

/// Write an unsolicited event transaction.
pub async fn write_event(stream: &mut TcpStream, ty: u16, fields: &[(FieldId, Vec<u8>)]) {
    let payload = if fields.is_empty() {
        Vec::new()
    } else {
        encode_params(fields).unwrap()
    };
    let size = payload.len() as u32;
    let header = FrameHeader {
        flags: 0,
        is_reply: 0,
        ty,
        id: 0,
        error: 0,
        total_size: size,
        data_size: size,
    };
    let tx = Transaction { header, payload };
    stream.write_all(&tx.to_bytes()).await.unwrap();
}

/// Serve the standard login exchange: reads the login transaction and
/// replies with a `Test` server at version 151.
pub async fn serve_login(stream: &mut TcpStream) -> Transaction {
    let login = read_tx(stream).await;
    assert_eq!(login.header.ty, 107);
    write_reply(
        stream,
        &login.header,
        0,
        &[
            (FieldId::Version, 151u16.to_be_bytes().to_vec()),
            (FieldId::ServerName, b"Test".to_vec()),
        ],
    )
    .await;
    login
}
