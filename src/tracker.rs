//! Tracker client for the `HTRK` listing protocol.
//!
//! Trackers are small directory servers enumerating public Hotline servers.
//! One TCP exchange per refresh: send the magic, read the header, read the
//! records. Refresh and retry policy belongs to the caller.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use std::net::Ipv4Addr;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    config::ClientConfig,
    macroman,
    protocol::{self, TRACKER_PORT},
    records::ByteReader,
    transaction::TransactionError,
    transport,
};

/// Errors surfaced by the tracker client.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker answered with an unexpected protocol identifier.
    #[error("invalid tracker reply")]
    InvalidReply,
    /// A listing record was truncated.
    #[error("truncated server record")]
    TruncatedRecord,
    /// The exchange stalled past its deadline.
    #[error("tracker timed out")]
    Timeout,
    /// Socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransactionError> for TrackerError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Timeout => Self::Timeout,
            TransactionError::Io(io) => Self::Io(io),
            _ => Self::TruncatedRecord,
        }
    }
}

/// One server listed by a tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackedServer {
    /// IPv4 address of the server.
    pub address: Ipv4Addr,
    /// Control port.
    pub port: u16,
    /// Connected user count.
    pub user_count: u16,
    /// Listing flags.
    pub flags: u16,
    /// Server name.
    pub name: String,
    /// Server description.
    pub description: String,
}

/// Fetch the server list from a tracker.
///
/// Entries whose name is a visual separator (runs of dashes and the like)
/// are dropped. Pass `None` for the default tracker port.
///
/// # Errors
/// Returns [`TrackerError::InvalidReply`] on a bad magic, or any transport
/// failure.
pub async fn list_servers(
    host: &str,
    port: Option<u16>,
    config: &ClientConfig,
) -> Result<Vec<TrackedServer>, TrackerError> {
    let port = port.unwrap_or(TRACKER_PORT);
    let deadline = config.handshake_timeout();
    let mut stream = transport::connect(host, port, deadline).await?;
    transport::write_all_timeout(&mut stream, &protocol::tracker_handshake(), deadline).await?;

    let mut header = [0u8; 8];
    transport::read_exact_timeout(&mut stream, &mut header, deadline).await?;
    if &header[0..4] != protocol::TRACKER_ID {
        return Err(TrackerError::InvalidReply);
    }
    let count = u16::from_be_bytes([header[6], header[7]]);
    debug!(host, count, "tracker listing");

    let mut servers = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let mut fixed = [0u8; 12];
        transport::read_exact_timeout(&mut stream, &mut fixed, deadline).await?;
        let mut rdr = ByteReader::new(&fixed);
        let address = Ipv4Addr::from(rdr.u32().map_err(|_| TrackerError::TruncatedRecord)?);
        let server_port = rdr.u16().map_err(|_| TrackerError::TruncatedRecord)?;
        let user_count = rdr.u16().map_err(|_| TrackerError::TruncatedRecord)?;
        let flags = rdr.u16().map_err(|_| TrackerError::TruncatedRecord)?;
        let name_len = rdr.u16().map_err(|_| TrackerError::TruncatedRecord)?;

        let mut name_buf = vec![0u8; usize::from(name_len)];
        transport::read_exact_timeout(&mut stream, &mut name_buf, deadline).await?;
        let mut desc_len_buf = [0u8; 2];
        transport::read_exact_timeout(&mut stream, &mut desc_len_buf, deadline).await?;
        let desc_len = u16::from_be_bytes(desc_len_buf);
        let mut desc_buf = vec![0u8; usize::from(desc_len)];
        transport::read_exact_timeout(&mut stream, &mut desc_buf, deadline).await?;

        let name = macroman::decode_text(&name_buf);
        if is_separator(&name) {
            continue;
        }
        servers.push(TrackedServer {
            address,
            port: server_port,
            user_count,
            flags,
            name,
            description: macroman::decode_text(&desc_buf),
        });
    }
    Ok(servers)
}

/// Trackers pad their listings with pseudo-entries drawn as rules.
fn is_separator(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| matches!(c, '-' | '=' | '_' | '\u{2013}' | '\u{2014}' | '*' | '~'))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("----------", true)]
    #[case("==========", true)]
    #[case("\u{2014}\u{2014}\u{2014}", true)]
    #[case("Fortress of Insanity", false)]
    #[case("-server-", false)]
    #[case("", false)]
    fn separator_detection(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_separator(name), expected);
    }
}
