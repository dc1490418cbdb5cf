//! Frame-level Hotline transaction encoding and decoding helpers.
//!
//! This module owns the fixed 20-byte header format and the in-memory
//! [`Transaction`] type. Incremental decoding of frames off a socket lives in
//! the sibling [`super::codec`] module.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use super::{HEADER_LEN, MAX_PAYLOAD_SIZE, errors::TransactionError};

/// Read a big-endian `u32` from the provided byte slice.
///
/// # Errors
/// Returns an error if `buf` is shorter than four bytes.
#[must_use = "handle the result"]
#[expect(clippy::indexing_slicing, reason = "length is checked before indexing")]
pub fn read_u32(buf: &[u8]) -> Result<u32, TransactionError> {
    if buf.len() < 4 {
        return Err(TransactionError::ShortBuffer);
    }
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Read a big-endian `u16` from the provided byte slice.
///
/// # Errors
/// Returns an error if `buf` is shorter than two bytes.
#[must_use = "handle the result"]
#[expect(clippy::indexing_slicing, reason = "length is checked before indexing")]
pub fn read_u16(buf: &[u8]) -> Result<u16, TransactionError> {
    if buf.len() < 2 {
        return Err(TransactionError::ShortBuffer);
    }
    Ok(u16::from_be_bytes([buf[0], buf[1]]))
}

/// Parsed frame header according to the protocol specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame flags (must be zero for protocol version 1).
    pub flags: u8,
    /// Whether this is a reply (0 = request or event, 1 = reply).
    pub is_reply: u8,
    /// Transaction type identifier.
    pub ty: u16,
    /// Transaction identifier for matching requests and replies.
    pub id: u32,
    /// Error code (0 indicates success).
    pub error: u32,
    /// Total size of the complete payload in bytes.
    pub total_size: u32,
    /// Size of the payload in this frame.
    pub data_size: u32,
}

impl FrameHeader {
    /// Parse a frame header from a 20-byte buffer.
    #[must_use = "use the returned header"]
    pub const fn from_bytes(buf: &[u8; HEADER_LEN]) -> Self {
        Self {
            flags: buf[0],
            is_reply: buf[1],
            ty: u16::from_be_bytes([buf[2], buf[3]]),
            id: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            error: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            total_size: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            data_size: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        }
    }

    /// Write the header to a 20-byte buffer.
    pub fn write_bytes(&self, buf: &mut [u8; HEADER_LEN]) {
        buf[0] = self.flags;
        buf[1] = self.is_reply;
        buf[2..4].copy_from_slice(&self.ty.to_be_bytes());
        buf[4..8].copy_from_slice(&self.id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.error.to_be_bytes());
        buf[12..16].copy_from_slice(&self.total_size.to_be_bytes());
        buf[16..20].copy_from_slice(&self.data_size.to_be_bytes());
    }

    /// Parse a frame header from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the slice is too short to hold a header.
    #[must_use = "handle the result"]
    pub fn new(buf: &[u8]) -> Result<Self, TransactionError> {
        let hdr: &[u8; HEADER_LEN] = buf
            .get(0..HEADER_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(TransactionError::ShortBuffer)?;
        Ok(Self::from_bytes(hdr))
    }

    /// Whether this frame is a reply to a request this client issued.
    #[must_use]
    pub const fn is_reply(&self) -> bool { self.is_reply != 0 }
}

/// Complete transaction assembled from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction frame header.
    pub header: FrameHeader,
    /// Complete payload data.
    pub payload: Vec<u8>,
}

impl Transaction {
    /// Build a request transaction around an already-encoded parameter block.
    ///
    /// # Errors
    /// Returns [`TransactionError::PayloadTooLarge`] if the payload exceeds
    /// the protocol limits.
    pub fn request(ty: u16, id: u32, payload: Vec<u8>) -> Result<Self, TransactionError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(TransactionError::PayloadTooLarge);
        }
        let size = u32::try_from(payload.len()).map_err(|_| TransactionError::PayloadTooLarge)?;
        Ok(Self {
            header: FrameHeader {
                flags: 0,
                is_reply: 0,
                ty,
                id,
                error: 0,
                total_size: size,
                data_size: size,
            },
            payload,
        })
    }

    /// Serialise the transaction into a single frame of bytes.
    #[must_use = "use the serialised bytes"]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        let mut hdr = [0u8; HEADER_LEN];
        self.header.write_bytes(&mut hdr);
        buf.extend_from_slice(&hdr);
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Parse a transaction from a single complete frame of bytes.
///
/// # Errors
/// Returns an error if the frame is malformed or exceeds size limits.
#[must_use = "handle the result"]
pub fn parse_transaction(buf: &[u8]) -> Result<Transaction, TransactionError> {
    let header = FrameHeader::new(buf)?;
    if header.flags != 0 {
        return Err(TransactionError::InvalidFlags);
    }
    if header.total_size as usize > MAX_PAYLOAD_SIZE {
        return Err(TransactionError::PayloadTooLarge);
    }
    if buf.len() != HEADER_LEN + header.total_size as usize {
        return Err(TransactionError::SizeMismatch);
    }
    if header.data_size != header.total_size {
        return Err(TransactionError::SizeMismatch);
    }
    let payload = buf.get(HEADER_LEN..).unwrap_or_default().to_vec();
    Ok(Transaction { header, payload })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FrameHeader {
        FrameHeader {
            flags: 0,
            is_reply: 1,
            ty: 107,
            id: 3,
            error: 0,
            total_size: 2,
            data_size: 2,
        }
    }

    #[test]
    fn header_round_trips() {
        let hdr = sample_header();
        let mut buf = [0u8; HEADER_LEN];
        hdr.write_bytes(&mut buf);
        assert_eq!(FrameHeader::from_bytes(&buf), hdr);
    }

    #[test]
    fn short_header_is_rejected() {
        assert!(matches!(
            FrameHeader::new(&[0u8; 10]),
            Err(TransactionError::ShortBuffer)
        ));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        let tx = Transaction {
            header: sample_header(),
            payload: vec![0xAA, 0xBB],
        };
        let mut bytes = tx.to_bytes();
        bytes.push(0);
        assert!(matches!(
            parse_transaction(&bytes),
            Err(TransactionError::SizeMismatch)
        ));
    }

    #[test]
    fn parse_round_trips_single_frame() {
        let tx = Transaction {
            header: sample_header(),
            payload: vec![0xAA, 0xBB],
        };
        let parsed = parse_transaction(&tx.to_bytes()).unwrap();
        assert_eq!(parsed, tx);
    }

    #[test]
    fn zero_field_frame_is_22_bytes() {
        let tx = Transaction::request(300, 9, vec![0, 0]).unwrap();
        assert_eq!(tx.to_bytes().len(), 22);
    }
}
