//! Framing, encoding, and decoding for Hotline transactions.
//!
//! Transactions consist of a [`FrameHeader`] followed by an optional payload
//! encoded using [`crate::field_id::FieldId`] identifiers. The framing layer
//! handles Hotline's 20-byte header and multi-fragment payload envelope
//! described in `docs/protocol.md`; [`TransactionCodec`] drives it
//! incrementally off a socket buffer.

pub mod codec;
pub mod errors;
pub mod frame;
pub mod params;

pub use codec::TransactionCodec;
pub use errors::TransactionError;
pub use frame::{FrameHeader, Transaction, parse_transaction, read_u16, read_u32};
pub use params::{ParamList, Params, decode_params, encode_params};

/// Length of a transaction frame header in bytes.
pub const HEADER_LEN: usize = 20;
/// Maximum payload size accepted for a buffered transaction.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024; // 1 MiB
/// Maximum data size per frame when writing.
pub const MAX_FRAME_DATA: usize = 32 * 1024; // 32 KiB
