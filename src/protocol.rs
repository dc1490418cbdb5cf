//! Constants and helpers for the wire protocol handshakes.
//!
//! Each of the three channels opens with its own magic: `TRTP`/`HOTL` on the
//! control connection, `HTXF` on transfer connections, and `HTRK` towards
//! trackers. This module owns those byte layouts; session and transfer logic
//! live in their own modules.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use thiserror::Error;

/// Number of bytes in the client control handshake message.
pub const HANDSHAKE_LEN: usize = 12;
/// Number of bytes in the server control handshake reply.
pub const HANDSHAKE_REPLY_LEN: usize = 8;
/// Fixed protocol identifier used on the control channel.
pub const PROTOCOL_ID: &[u8; 4] = b"TRTP";
/// Sub-protocol identifier sent by Hotline clients.
pub const SUB_PROTOCOL_ID: &[u8; 4] = b"HOTL";
/// Protocol version spoken by this client.
pub const VERSION: u16 = 1;
/// Sub-version sent in the handshake.
pub const SUB_VERSION: u16 = 2;
/// Version number reported in login requests.
pub const CLIENT_VERSION: u16 = 123;

/// Number of bytes in a transfer channel handshake.
pub const TRANSFER_HANDSHAKE_LEN: usize = 16;
/// Magic opening every transfer channel.
pub const TRANSFER_ID: &[u8; 4] = b"HTXF";

/// Number of bytes in the tracker handshake message.
pub const TRACKER_HANDSHAKE_LEN: usize = 12;
/// Magic opening a tracker connection.
pub const TRACKER_ID: &[u8; 4] = b"HTRK";
/// Default tracker port.
pub const TRACKER_PORT: u16 = 5498;

/// Errors produced while negotiating a handshake.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The peer answered with an unexpected protocol identifier.
    #[error("invalid protocol id")]
    InvalidProtocol,
    /// The peer refused the handshake with the given code.
    #[error("handshake refused with code {0}")]
    Refused(u32),
}

/// Build the 12-byte control handshake message.
#[must_use]
pub fn control_handshake() -> [u8; HANDSHAKE_LEN] {
    let mut buf = [0u8; HANDSHAKE_LEN];
    buf[0..4].copy_from_slice(PROTOCOL_ID);
    buf[4..8].copy_from_slice(SUB_PROTOCOL_ID);
    buf[8..10].copy_from_slice(&VERSION.to_be_bytes());
    buf[10..12].copy_from_slice(&SUB_VERSION.to_be_bytes());
    buf
}

/// Parse the 8-byte control handshake reply.
///
/// # Errors
/// Returns an error if the protocol identifier is wrong or the server
/// reported a nonzero error code.
#[must_use = "handle the result"]
pub fn parse_control_reply(buf: &[u8; HANDSHAKE_REPLY_LEN]) -> Result<(), HandshakeError> {
    if &buf[0..4] != PROTOCOL_ID {
        return Err(HandshakeError::InvalidProtocol);
    }
    let code = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if code != 0 {
        return Err(HandshakeError::Refused(code));
    }
    Ok(())
}

/// Kind of payload carried on a transfer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    /// Single flattened file, or a raw banner/preview stream.
    File,
    /// Item sequence of a folder transfer.
    Folder,
}

/// Build the 16-byte transfer channel handshake.
#[must_use]
pub fn transfer_handshake(
    reference: u32,
    data_size: u32,
    kind: TransferKind,
) -> [u8; TRANSFER_HANDSHAKE_LEN] {
    let mut buf = [0u8; TRANSFER_HANDSHAKE_LEN];
    buf[0..4].copy_from_slice(TRANSFER_ID);
    buf[4..8].copy_from_slice(&reference.to_be_bytes());
    buf[8..12].copy_from_slice(&data_size.to_be_bytes());
    if matches!(kind, TransferKind::Folder) {
        buf[12..14].copy_from_slice(&1u16.to_be_bytes());
    }
    buf
}

/// Build the 12-byte tracker handshake message.
#[must_use]
pub fn tracker_handshake() -> [u8; TRACKER_HANDSHAKE_LEN] {
    let mut buf = [0u8; TRACKER_HANDSHAKE_LEN];
    buf[0..4].copy_from_slice(TRACKER_ID);
    buf[4..6].copy_from_slice(&VERSION.to_be_bytes());
    buf[6..8].copy_from_slice(&SUB_VERSION.to_be_bytes());
    buf
}
