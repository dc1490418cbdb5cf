//! Tracker listing against a scripted tracker.

#![expect(clippy::unwrap_used, reason = "test code can panic")]

mod common;

use common::{bind, test_config};
use mxc::tracker::{TrackerError, list_servers};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn record(address: [u8; 4], port: u16, users: u16, name: &str, desc: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&address);
    buf.extend_from_slice(&port.to_be_bytes());
    buf.extend_from_slice(&users.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes()); // flags
    buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(desc.len() as u16).to_be_bytes());
    buf.extend_from_slice(desc.as_bytes());
    buf
}

#[tokio::test]
async fn lists_servers_and_drops_separators() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; 12];
        stream.read_exact(&mut handshake).await.unwrap();
        assert_eq!(&handshake[0..4], b"HTRK");

        let mut reply = Vec::new();
        reply.extend_from_slice(b"HTRK");
        reply.extend_from_slice(&1u16.to_be_bytes());
        reply.extend_from_slice(&3u16.to_be_bytes()); // three records
        reply.extend_from_slice(&record([10, 0, 0, 1], 5500, 12, "Fortress", "old school"));
        reply.extend_from_slice(&record([0, 0, 0, 0], 0, 0, "----------", ""));
        reply.extend_from_slice(&record([192, 168, 1, 9], 5600, 3, "Attic", "files only"));
        stream.write_all(&reply).await.unwrap();
        stream
    });

    let servers = list_servers("127.0.0.1", Some(port), &test_config())
        .await
        .unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].name, "Fortress");
    assert_eq!(servers[0].address.octets(), [10, 0, 0, 1]);
    assert_eq!(servers[0].port, 5500);
    assert_eq!(servers[0].user_count, 12);
    assert_eq!(servers[1].name, "Attic");
    assert_eq!(servers[1].description, "files only");
}

#[tokio::test]
async fn empty_listing_yields_no_servers() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; 12];
        stream.read_exact(&mut handshake).await.unwrap();
        let mut reply = Vec::new();
        reply.extend_from_slice(b"HTRK");
        reply.extend_from_slice(&1u16.to_be_bytes());
        reply.extend_from_slice(&0u16.to_be_bytes());
        stream.write_all(&reply).await.unwrap();
        stream
    });

    let servers = list_servers("127.0.0.1", Some(port), &test_config())
        .await
        .unwrap();
    assert!(servers.is_empty());
}

#[tokio::test]
async fn wrong_magic_is_rejected() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake = [0u8; 12];
        stream.read_exact(&mut handshake).await.unwrap();
        stream.write_all(b"NOPE\x00\x01\x00\x00").await.unwrap();
        stream
    });

    let err = list_servers("127.0.0.1", Some(port), &test_config())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::InvalidReply));
}
