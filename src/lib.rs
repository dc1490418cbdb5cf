//! Core client library for the Hotline wire protocol.
//!
//! This crate speaks the classic Hotline protocol to a remote server and
//! exposes a typed, event-driven [`session::Session`]: handshake, login,
//! request/reply correlation, an event stream for unsolicited traffic, and
//! keep-alives. File transfers run on their own one-shot channels through
//! the engines in [`transfer`]; [`tracker`] lists public servers. UI
//! concerns (bookmarks, rendering, notifications) live in embedding shells,
//! not here.

#![cfg_attr(test, expect(clippy::unwrap_used, reason = "test code can panic"))]
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "test code with known bounds")
)]
#![cfg_attr(
    test,
    expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")
)]
#![cfg_attr(test, expect(clippy::str_to_string, reason = "test code"))]

pub mod config;
pub mod date;
pub mod field_id;
pub mod macroman;
pub mod privileges;
pub mod protocol;
pub mod records;
pub mod session;
pub mod tracker;
pub mod transaction;
pub mod transaction_type;
pub mod transfer;
pub mod transport;
pub mod user_flags;
