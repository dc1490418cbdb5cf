//! Tokio codec for Hotline transaction framing.
//!
//! The decoder consumes frames off a `BytesMut` buffer and reassembles
//! multi-fragment payloads (`data size < total size`) into complete
//! [`Transaction`] values. Continuation frames must repeat the first frame's
//! header. The encoder fragments outbound payloads at [`MAX_FRAME_DATA`],
//! although client requests fit a single frame in practice.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    HEADER_LEN,
    MAX_FRAME_DATA,
    MAX_PAYLOAD_SIZE,
    errors::TransactionError,
    frame::{FrameHeader, Transaction},
};

/// Reassembly state for a transaction spanning multiple frames.
#[derive(Debug)]
struct PartialTransaction {
    header: FrameHeader,
    payload: Vec<u8>,
}

/// Incremental decoder/encoder for Hotline transactions.
#[derive(Debug, Default)]
pub struct TransactionCodec {
    partial: Option<PartialTransaction>,
}

impl TransactionCodec {
    /// Create a codec with no in-flight reassembly state.
    #[must_use]
    pub const fn new() -> Self { Self { partial: None } }
}

const fn validate_first_header(header: &FrameHeader) -> Result<(), TransactionError> {
    if header.flags != 0 {
        return Err(TransactionError::InvalidFlags);
    }
    if header.total_size as usize > MAX_PAYLOAD_SIZE {
        return Err(TransactionError::PayloadTooLarge);
    }
    if header.data_size > header.total_size {
        return Err(TransactionError::SizeMismatch);
    }
    if header.data_size == 0 && header.total_size > 0 {
        return Err(TransactionError::SizeMismatch);
    }
    Ok(())
}

const fn validate_continuation(
    first: &FrameHeader,
    next: &FrameHeader,
    remaining: u32,
) -> Result<(), TransactionError> {
    if next.flags != first.flags
        || next.is_reply != first.is_reply
        || next.ty != first.ty
        || next.id != first.id
        || next.error != first.error
        || next.total_size != first.total_size
    {
        return Err(TransactionError::HeaderMismatch);
    }
    if next.data_size == 0 || next.data_size > remaining {
        return Err(TransactionError::SizeMismatch);
    }
    Ok(())
}

/// Split the next frame off `src`, or return `Ok(None)` if it is incomplete.
///
/// The per-frame size bound is checked before any buffer space is reserved so
/// a corrupt header cannot trigger a huge allocation.
fn take_frame(src: &mut BytesMut) -> Result<Option<(FrameHeader, BytesMut)>, TransactionError> {
    let Some(hdr) = src
        .get(0..HEADER_LEN)
        .and_then(|s| <&[u8; HEADER_LEN]>::try_from(s).ok())
    else {
        return Ok(None);
    };
    let header = FrameHeader::from_bytes(hdr);
    if header.data_size as usize > MAX_PAYLOAD_SIZE {
        return Err(TransactionError::PayloadTooLarge);
    }
    let frame_len = HEADER_LEN + header.data_size as usize;
    if src.len() < frame_len {
        src.reserve(frame_len - src.len());
        return Ok(None);
    }
    src.advance(HEADER_LEN);
    let data = src.split_to(header.data_size as usize);
    Ok(Some((header, data)))
}

impl Decoder for TransactionCodec {
    type Item = Transaction;
    type Error = TransactionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Transaction>, TransactionError> {
        loop {
            let Some(partial) = self.partial.take() else {
                let Some((header, data)) = take_frame(src)? else {
                    return Ok(None);
                };
                validate_first_header(&header)?;
                let mut tx = PartialTransaction {
                    header,
                    payload: data.to_vec(),
                };
                if tx.payload.len() == tx.header.total_size as usize {
                    tx.header.data_size = tx.header.total_size;
                    return Ok(Some(Transaction {
                        header: tx.header,
                        payload: tx.payload,
                    }));
                }
                self.partial = Some(tx);
                continue;
            };

            let mut tx = partial;
            let Some((next, data)) = take_frame(src)? else {
                self.partial = Some(tx);
                return Ok(None);
            };
            let remaining =
                tx.header.total_size - u32::try_from(tx.payload.len()).unwrap_or(u32::MAX);
            validate_continuation(&tx.header, &next, remaining)?;
            tx.payload.extend_from_slice(&data);
            if tx.payload.len() == tx.header.total_size as usize {
                tx.header.data_size = tx.header.total_size;
                return Ok(Some(Transaction {
                    header: tx.header,
                    payload: tx.payload,
                }));
            }
            self.partial = Some(tx);
        }
    }
}

impl Encoder<Transaction> for TransactionCodec {
    type Error = TransactionError;

    fn encode(&mut self, tx: Transaction, dst: &mut BytesMut) -> Result<(), TransactionError> {
        if tx.header.flags != 0 {
            return Err(TransactionError::InvalidFlags);
        }
        if tx.payload.len() > MAX_PAYLOAD_SIZE
            || tx.header.total_size as usize != tx.payload.len()
        {
            return Err(TransactionError::SizeMismatch);
        }
        let mut hdr_buf = [0u8; HEADER_LEN];
        if tx.payload.is_empty() {
            let mut header = tx.header;
            header.data_size = 0;
            header.write_bytes(&mut hdr_buf);
            dst.put_slice(&hdr_buf);
            return Ok(());
        }
        let mut offset = 0usize;
        while offset < tx.payload.len() {
            let end = (offset + MAX_FRAME_DATA).min(tx.payload.len());
            let chunk = tx
                .payload
                .get(offset..end)
                .ok_or(TransactionError::SizeMismatch)?;
            let mut header = tx.header.clone();
            header.data_size =
                u32::try_from(chunk.len()).map_err(|_| TransactionError::PayloadTooLarge)?;
            header.write_bytes(&mut hdr_buf);
            dst.put_slice(&hdr_buf);
            dst.put_slice(chunk);
            offset = end;
        }
        Ok(())
    }
}
