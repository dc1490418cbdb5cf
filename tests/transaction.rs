//! Framing round-trips and rejection cases for the transaction codec.

#![expect(clippy::unwrap_used, reason = "test code can panic")]

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use mxc::{
    field_id::FieldId,
    transaction::{
        FrameHeader, HEADER_LEN, MAX_FRAME_DATA, MAX_PAYLOAD_SIZE, ParamList, Params, Transaction,
        TransactionCodec, TransactionError, encode_params,
    },
};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

fn build_tx() -> Transaction {
    let payload = ParamList::new()
        .bytes(FieldId::Other(1), vec![0xFF])
        .bytes(FieldId::Other(2), vec![0xAA, 0xBB])
        .encode()
        .unwrap();
    Transaction::request(1, 1, payload).unwrap()
}

#[tokio::test]
async fn roundtrip_single_frame() {
    let tx = build_tx();
    let (a, b) = tokio::io::duplex(1024);
    let mut writer = FramedWrite::new(a, TransactionCodec::new());
    let mut reader = FramedRead::new(b, TransactionCodec::new());
    writer.send(tx.clone()).await.unwrap();
    let rx = reader.next().await.unwrap().unwrap();
    assert_eq!(tx, rx);
}

#[tokio::test]
async fn roundtrip_empty_payload() {
    let tx = Transaction::request(300, 42, Vec::new()).unwrap();
    let (a, b) = tokio::io::duplex(64);
    let mut writer = FramedWrite::new(a, TransactionCodec::new());
    let mut reader = FramedRead::new(b, TransactionCodec::new());
    writer.send(tx.clone()).await.unwrap();
    let rx = reader.next().await.unwrap().unwrap();
    assert_eq!(tx, rx);
    assert_eq!(rx.header.total_size, 0);
}

#[tokio::test]
async fn roundtrip_multi_frame() {
    let value = vec![0u8; MAX_FRAME_DATA + 1];
    let payload = encode_params(&[(FieldId::Other(16), value.as_slice())]).unwrap();
    let tx = Transaction::request(1, 2, payload).unwrap();
    let (a, b) = tokio::io::duplex(256 * 1024);
    let mut writer = FramedWrite::new(a, TransactionCodec::new());
    let mut reader = FramedRead::new(b, TransactionCodec::new());
    writer.send(tx.clone()).await.unwrap();
    let rx = reader.next().await.unwrap().unwrap();
    assert_eq!(tx, rx);
}

#[test]
fn invalid_flags_rejected_both_ways() {
    let mut tx = build_tx();
    tx.header.flags = 1;
    let mut codec = TransactionCodec::new();
    let mut out = BytesMut::new();
    assert!(matches!(
        codec.encode(tx.clone(), &mut out),
        Err(TransactionError::InvalidFlags)
    ));
    let mut incoming = BytesMut::from(tx.to_bytes().as_slice());
    assert!(matches!(
        codec.decode(&mut incoming),
        Err(TransactionError::InvalidFlags)
    ));
}

#[test]
fn oversized_payload_rejected_on_decode() {
    let mut header_bytes = [0u8; HEADER_LEN];
    let header = FrameHeader {
        flags: 0,
        is_reply: 0,
        ty: 9,
        id: 5,
        error: 0,
        total_size: (MAX_PAYLOAD_SIZE as u32) + 1,
        data_size: 1,
    };
    header.write_bytes(&mut header_bytes);
    let mut incoming = BytesMut::from(header_bytes.as_slice());
    incoming.extend_from_slice(&[0]);
    let mut codec = TransactionCodec::new();
    assert!(matches!(
        codec.decode(&mut incoming),
        Err(TransactionError::PayloadTooLarge)
    ));
}

#[test]
fn zero_field_frame_is_22_bytes() {
    let payload = ParamList::new().encode().unwrap();
    let tx = Transaction::request(300, 7, payload).unwrap();
    let bytes = tx.to_bytes();
    assert_eq!(bytes.len(), 22);
    let decoded = Params::decode(&tx.payload).unwrap();
    assert!(decoded.is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn decode_inverts_encode(
        ty in any::<u16>(),
        id in any::<u32>(),
        fields in proptest::collection::vec(
            (any::<u16>(), proptest::collection::vec(any::<u8>(), 0..64)),
            0..8,
        )
    ) {
        let pairs: Vec<(FieldId, Vec<u8>)> = fields
            .into_iter()
            .map(|(raw, value)| (FieldId::from(raw), value))
            .collect();
        let payload = encode_params(&pairs).unwrap();
        let tx = Transaction::request(ty, id, payload).unwrap();

        let mut codec = TransactionCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(tx.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        prop_assert_eq!(&decoded, &tx);
        prop_assert!(buf.is_empty());

        let expected_sum: usize = 2 + decoded_field_len(&decoded.payload);
        if !tx.payload.is_empty() {
            prop_assert_eq!(tx.header.total_size as usize, expected_sum);
        }
    }
}

/// Recompute `sum over fields of (4 + length)` from a decoded payload.
fn decoded_field_len(payload: &[u8]) -> usize {
    let params = mxc::transaction::decode_params(payload).unwrap();
    params.iter().map(|(_, value)| 4 + value.len()).sum()
}
