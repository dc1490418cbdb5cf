//! Hotline date coding.
//!
//! Dates travel as an 8-byte quadruple: two reserved bytes, the year, the
//! 1-based day of the year, and the minute of the day. An all-zero quadruple
//! stands for "no date".

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::transaction::{TransactionError, read_u16};

/// Number of bytes in a wire date.
pub const DATE_LEN: usize = 8;

/// Encode a timestamp as the Hotline date quadruple.
#[must_use]
pub fn encode_date(ts: NaiveDateTime) -> [u8; DATE_LEN] {
    let mut buf = [0u8; DATE_LEN];
    let year = u16::try_from(ts.year()).unwrap_or(0);
    let day = u16::try_from(ts.ordinal()).unwrap_or(1);
    let minute = u16::try_from(ts.hour() * 60 + ts.minute()).unwrap_or(0);
    buf[2..4].copy_from_slice(&year.to_be_bytes());
    buf[4..6].copy_from_slice(&day.to_be_bytes());
    buf[6..8].copy_from_slice(&minute.to_be_bytes());
    buf
}

/// Decode a Hotline date quadruple.
///
/// Returns `Ok(None)` for the all-zero "no date" encoding.
///
/// # Errors
/// Returns an error if the buffer is shorter than eight bytes or the fields
/// do not name a valid calendar date.
#[must_use = "handle the result"]
pub fn decode_date(buf: &[u8]) -> Result<Option<NaiveDateTime>, TransactionError> {
    if buf.len() < DATE_LEN {
        return Err(TransactionError::ShortBuffer);
    }
    let year = read_u16(buf.get(2..4).unwrap_or_default())?;
    let day = read_u16(buf.get(4..6).unwrap_or_default())?;
    let minute = read_u16(buf.get(6..8).unwrap_or_default())?;
    if year == 0 {
        return Ok(None);
    }
    let date = NaiveDate::from_yo_opt(i32::from(year), u32::from(day.max(1)))
        .ok_or(TransactionError::SizeMismatch)?;
    let time = date
        .and_hms_opt(u32::from(minute) / 60, u32::from(minute) % 60, 0)
        .ok_or(TransactionError::SizeMismatch)?;
    Ok(Some(time))
}
