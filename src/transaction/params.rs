//! Parameter block helpers for Hotline transactions.
//!
//! The payload for most transactions is a list of parameters, each keyed by a
//! 16-bit [`FieldId`]. Replies routinely repeat a field id (file and user
//! listings carry one record per field), so order is preserved and duplicates
//! are permitted. Typed accessors live on [`Params`]; requests are assembled
//! through [`ParamList`].

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use chrono::NaiveDateTime;

use super::{errors::TransactionError, frame::read_u16};
use crate::{date, field_id::FieldId, macroman};

/// Decode the parameter block into an ordered list of field id/value pairs.
///
/// # Errors
/// Returns an error if the buffer cannot be parsed.
#[must_use = "handle the result"]
pub fn decode_params(buf: &[u8]) -> Result<Vec<(FieldId, Vec<u8>)>, TransactionError> {
    if buf.is_empty() {
        return Ok(Vec::new());
    }
    if buf.len() < 2 {
        return Err(TransactionError::SizeMismatch);
    }
    let param_count = read_u16(buf.get(0..2).unwrap_or_default())? as usize;
    let mut offset = 2;
    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        let Some(header) = buf.get(offset..offset + 4) else {
            return Err(TransactionError::SizeMismatch);
        };
        let field_id = read_u16(header)?;
        let field_len = read_u16(header.get(2..4).unwrap_or_default())? as usize;
        offset += 4;
        let Some(value) = buf.get(offset..offset + field_len) else {
            return Err(TransactionError::SizeMismatch);
        };
        params.push((FieldId::from(field_id), value.to_vec()));
        offset += field_len;
    }
    if offset != buf.len() {
        return Err(TransactionError::SizeMismatch);
    }
    Ok(params)
}

/// Build a parameter block from field id/data pairs.
///
/// # Errors
/// Returns [`TransactionError::PayloadTooLarge`] if the number of parameters
/// or any data length exceeds `u16::MAX`.
#[must_use = "use the encoded bytes"]
pub fn encode_params<T: AsRef<[u8]>>(params: &[(FieldId, T)]) -> Result<Vec<u8>, TransactionError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(
        &u16::try_from(params.len())
            .map_err(|_| TransactionError::PayloadTooLarge)?
            .to_be_bytes(),
    );
    for (id, data) in params {
        let data = data.as_ref();
        let raw: u16 = (*id).into();
        buf.extend_from_slice(&raw.to_be_bytes());
        buf.extend_from_slice(
            &u16::try_from(data.len())
                .map_err(|_| TransactionError::PayloadTooLarge)?
                .to_be_bytes(),
        );
        buf.extend_from_slice(data);
    }
    Ok(buf)
}

/// Decoded parameter block with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(FieldId, Vec<u8>)>);

impl Params {
    /// Decode a payload into a parameter view.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be parsed.
    #[must_use = "handle the result"]
    pub fn decode(payload: &[u8]) -> Result<Self, TransactionError> {
        decode_params(payload).map(Self)
    }

    /// Whether the block carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Whether the block carries the given field at least once.
    #[must_use]
    pub fn contains(&self, field: FieldId) -> bool {
        self.0.iter().any(|(id, _)| *id == field)
    }

    /// First value for `field`, if present.
    #[must_use]
    pub fn first(&self, field: FieldId) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(id, _)| *id == field)
            .map(|(_, v)| v.as_slice())
    }

    /// All values for `field` in arrival order.
    pub fn all(&self, field: FieldId) -> impl Iterator<Item = &[u8]> {
        self.0
            .iter()
            .filter(move |(id, _)| *id == field)
            .map(|(_, v)| v.as_slice())
    }

    /// First value for `field` as a big-endian `u16`.
    ///
    /// Shorter values are zero-extended, as classic servers encode small
    /// integers in as few bytes as they please.
    #[must_use]
    pub fn first_u16(&self, field: FieldId) -> Option<u16> {
        self.first(field).map(int_be::<u16, 2>)
    }

    /// First value for `field` as a big-endian `u32`.
    #[must_use]
    pub fn first_u32(&self, field: FieldId) -> Option<u32> {
        self.first(field).map(int_be::<u32, 4>)
    }

    /// First value for `field` as a big-endian `u64`.
    #[must_use]
    pub fn first_u64(&self, field: FieldId) -> Option<u64> {
        self.first(field).map(int_be::<u64, 8>)
    }

    /// First value for `field` decoded as wire text.
    #[must_use]
    pub fn first_str(&self, field: FieldId) -> Option<String> {
        self.first(field).map(macroman::decode_text)
    }

    /// First value for `field` decoded through the credential complement.
    #[must_use]
    pub fn first_negated_str(&self, field: FieldId) -> Option<String> {
        self.first(field).map(macroman::decode_negated)
    }

    /// First value for `field` decoded as a wire date.
    #[must_use]
    pub fn first_date(&self, field: FieldId) -> Option<NaiveDateTime> {
        self.first(field).and_then(|v| date::decode_date(v).ok()?)
    }
}

fn int_be<T, const N: usize>(bytes: &[u8]) -> T
where
    T: From<u8> + std::ops::Shl<u32, Output = T> + std::ops::BitOr<Output = T>,
{
    bytes
        .iter()
        .take(N)
        .fold(T::from(0), |acc, &b| (acc << 8) | T::from(b))
}

/// Ordered parameter list under construction for a request.
#[derive(Debug, Default)]
pub struct ParamList {
    items: Vec<(FieldId, Vec<u8>)>,
    encoding: crate::config::StringEncoding,
}

impl ParamList {
    /// Start an empty list using the default MacRoman wire encoding.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Override the text encoding used by [`str`](Self::str) and
    /// [`negated_str`](Self::negated_str).
    #[must_use]
    pub fn with_encoding(mut self, encoding: crate::config::StringEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Append raw bytes.
    #[must_use]
    pub fn bytes(mut self, field: FieldId, value: impl Into<Vec<u8>>) -> Self {
        self.items.push((field, value.into()));
        self
    }

    /// Append a big-endian `u16`.
    #[must_use]
    pub fn u16(self, field: FieldId, value: u16) -> Self {
        self.bytes(field, value.to_be_bytes().to_vec())
    }

    /// Append a big-endian `u32`.
    #[must_use]
    pub fn u32(self, field: FieldId, value: u32) -> Self {
        self.bytes(field, value.to_be_bytes().to_vec())
    }

    /// Append wire-encoded text.
    #[must_use]
    pub fn str(self, field: FieldId, value: &str) -> Self {
        let encoded = macroman::encode_text_as(value, self.encoding);
        self.bytes(field, encoded)
    }

    /// Append complement-obfuscated credential text.
    #[must_use]
    pub fn negated_str(self, field: FieldId, value: &str) -> Self {
        let encoded = macroman::negate(&macroman::encode_text_as(value, self.encoding));
        self.bytes(field, encoded)
    }

    /// Append a field only when a value is present.
    #[must_use]
    pub fn maybe(self, field: FieldId, value: Option<Vec<u8>>) -> Self {
        match value {
            Some(v) => self.bytes(field, v),
            None => self,
        }
    }

    /// Encode the list as a payload.
    ///
    /// # Errors
    /// Returns an error if any length exceeds the protocol limits.
    #[must_use = "use the encoded bytes"]
    pub fn encode(self) -> Result<Vec<u8>, TransactionError> { encode_params(&self.items) }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_payload_decodes_to_no_fields() {
        let params = Params::decode(&[]).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn round_trips_ordered_fields() {
        let payload = ParamList::new()
            .u16(FieldId::UserIconId, 414)
            .str(FieldId::UserName, "Alice")
            .encode()
            .unwrap();
        let params = Params::decode(&payload).unwrap();
        assert_eq!(params.first_u16(FieldId::UserIconId), Some(414));
        assert_eq!(params.first_str(FieldId::UserName).as_deref(), Some("Alice"));
    }

    #[test]
    fn duplicate_fields_are_preserved_in_order() {
        let payload = ParamList::new()
            .bytes(FieldId::FileNameWithInfo, vec![1])
            .bytes(FieldId::FileNameWithInfo, vec![2])
            .encode()
            .unwrap();
        let params = Params::decode(&payload).unwrap();
        let values: Vec<_> = params.all(FieldId::FileNameWithInfo).collect();
        assert_eq!(values, vec![[1].as_slice(), [2].as_slice()]);
    }

    #[test]
    fn short_integer_values_zero_extend() {
        let payload = encode_params(&[(FieldId::UserId, [7u8].as_slice())]).unwrap();
        let params = Params::decode(&payload).unwrap();
        assert_eq!(params.first_u16(FieldId::UserId), Some(7));
        assert_eq!(params.first_u32(FieldId::UserId), Some(7));
    }

    #[rstest]
    #[case(&[0u8])]
    #[case(&[0, 1, 0, 100, 0])]
    #[case(&[0, 1, 0, 100, 0, 5, 0xFF])]
    fn malformed_blocks_are_rejected(#[case] payload: &[u8]) {
        assert!(Params::decode(payload).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut payload = ParamList::new()
            .u16(FieldId::UserId, 1)
            .encode()
            .unwrap();
        payload.push(0);
        assert!(Params::decode(&payload).is_err());
    }

    #[test]
    fn credentials_round_trip_through_complement() {
        let payload = ParamList::new()
            .negated_str(FieldId::Login, "guest")
            .encode()
            .unwrap();
        let params = Params::decode(&payload).unwrap();
        assert_ne!(params.first(FieldId::Login), Some(b"guest".as_slice()));
        assert_eq!(params.first_negated_str(FieldId::Login).as_deref(), Some("guest"));
    }

    #[test]
    fn utf8_encoding_overrides_macroman() {
        let payload = ParamList::new()
            .with_encoding(crate::config::StringEncoding::Utf8)
            .str(FieldId::UserName, "caf\u{E9}")
            .encode()
            .unwrap();
        let params = Params::decode(&payload).unwrap();
        assert_eq!(
            params.first(FieldId::UserName),
            Some("caf\u{E9}".as_bytes())
        );
        assert_eq!(params.first_str(FieldId::UserName).as_deref(), Some("caf\u{E9}"));
    }

    #[test]
    fn maximum_field_length_round_trips() {
        let value = vec![0xABu8; usize::from(u16::MAX)];
        let payload = encode_params(&[(FieldId::Data, value.as_slice())]).unwrap();
        let params = Params::decode(&payload).unwrap();
        assert_eq!(params.first(FieldId::Data).map(<[u8]>::len), Some(65_535));
    }
}
