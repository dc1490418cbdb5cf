//! Flattened file objects (`FILP`) used on file transfer channels.
//!
//! A flattened file is an envelope of forks: `INFO` carries metadata, `DATA`
//! the file contents, `MACR` an optional resource fork. Downloads parse the
//! envelope off the channel; uploads assemble one from a local file. Layouts
//! are in `docs/protocol.md`.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use chrono::NaiveDateTime;

use crate::{
    date::{self, DATE_LEN},
    macroman,
    records::{ByteReader, FourCC},
    transaction::TransactionError,
};

/// Magic opening a flattened file object.
pub const FILP_MAGIC: &[u8; 4] = b"FILP";
/// Envelope version this client speaks.
pub const FILP_VERSION: u16 = 1;
/// Length of the envelope header.
pub const ENVELOPE_LEN: usize = 24;
/// Length of a fork header.
pub const FORK_HEADER_LEN: usize = 16;

/// Fork carrying file metadata.
pub const FORK_INFO: [u8; 4] = *b"INFO";
/// Fork carrying the data fork bytes.
pub const FORK_DATA: [u8; 4] = *b"DATA";
/// Fork carrying the classic Mac resource fork.
pub const FORK_MACR: [u8; 4] = *b"MACR";

/// Platform tag written into `INFO` forks.
const PLATFORM_AMAC: [u8; 4] = *b"AMAC";

/// Parsed envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope version.
    pub version: u16,
    /// Number of forks that follow.
    pub fork_count: u16,
}

impl Envelope {
    /// Parse the 24-byte envelope header.
    ///
    /// # Errors
    /// Returns an error if the magic or length is wrong.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8; ENVELOPE_LEN]) -> Result<Self, TransactionError> {
        if &buf[0..4] != FILP_MAGIC {
            return Err(TransactionError::SizeMismatch);
        }
        Ok(Self {
            version: u16::from_be_bytes([buf[4], buf[5]]),
            fork_count: u16::from_be_bytes([buf[22], buf[23]]),
        })
    }

    /// Encode the 24-byte envelope header.
    #[must_use]
    pub fn encode(&self) -> [u8; ENVELOPE_LEN] {
        let mut buf = [0u8; ENVELOPE_LEN];
        buf[0..4].copy_from_slice(FILP_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[22..24].copy_from_slice(&self.fork_count.to_be_bytes());
        buf
    }
}

/// Parsed fork header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkHeader {
    /// Fork type code.
    pub fork_type: [u8; 4],
    /// Fork flags.
    pub flags: u32,
    /// Fork byte count; zero from some servers, see the download engine for
    /// the fallback.
    pub data_size: u32,
}

impl ForkHeader {
    /// Parse the 16-byte fork header.
    #[must_use]
    pub const fn parse(buf: &[u8; FORK_HEADER_LEN]) -> Self {
        Self {
            fork_type: [buf[0], buf[1], buf[2], buf[3]],
            flags: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            data_size: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }

    /// Encode the 16-byte fork header.
    #[must_use]
    pub fn encode(&self) -> [u8; FORK_HEADER_LEN] {
        let mut buf = [0u8; FORK_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.fork_type);
        buf[4..8].copy_from_slice(&self.flags.to_be_bytes());
        buf[12..16].copy_from_slice(&self.data_size.to_be_bytes());
        buf
    }
}

/// Metadata carried in an `INFO` fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoFork {
    /// File type code.
    pub type_code: FourCC,
    /// File creator code.
    pub creator: FourCC,
    /// Finder flags.
    pub flags: u32,
    /// Creation date.
    pub created: Option<NaiveDateTime>,
    /// Modification date.
    pub modified: Option<NaiveDateTime>,
    /// Script code of the name.
    pub name_script: u16,
    /// File name.
    pub name: String,
    /// File comment.
    pub comment: String,
}

impl InfoFork {
    /// A plain info fork around just a name and modification time.
    #[must_use]
    pub fn plain(name: &str, modified: Option<NaiveDateTime>) -> Self {
        Self {
            type_code: FourCC::UNKNOWN,
            creator: FourCC::UNKNOWN,
            flags: 0,
            created: None,
            modified,
            name_script: 0,
            name: name.to_owned(),
            comment: String::new(),
        }
    }

    /// Parse an `INFO` fork body.
    ///
    /// # Errors
    /// Returns an error if the fork is truncated.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8]) -> Result<Self, TransactionError> {
        let mut rdr = ByteReader::new(buf);
        rdr.take(4)?; // platform
        let type_code = FourCC(rdr.take(4)?.try_into().unwrap_or([0; 4]));
        let creator = FourCC(rdr.take(4)?.try_into().unwrap_or([0; 4]));
        let flags = rdr.u32()?;
        rdr.u32()?; // platform flags
        rdr.take(32)?; // reserved
        let created = date::decode_date(rdr.take(DATE_LEN)?)?;
        let modified = date::decode_date(rdr.take(DATE_LEN)?)?;
        let name_script = rdr.u16()?;
        let name_len = rdr.u16()?;
        let name = macroman::decode_text(rdr.take(usize::from(name_len))?);
        let comment = if rdr.remaining() >= 2 {
            let comment_len = rdr.u16()?;
            macroman::decode_text(rdr.take(usize::from(comment_len))?)
        } else {
            String::new()
        };
        Ok(Self {
            type_code,
            creator,
            flags,
            created,
            modified,
            name_script,
            name,
            comment,
        })
    }

    /// Encode as an `INFO` fork body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = macroman::encode_text(&self.name);
        let comment = macroman::encode_text(&self.comment);
        let mut buf = Vec::with_capacity(76 + name.len() + comment.len());
        buf.extend_from_slice(&PLATFORM_AMAC);
        buf.extend_from_slice(&self.type_code.0);
        buf.extend_from_slice(&self.creator.0);
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&[0u8; 4]); // platform flags
        buf.extend_from_slice(&[0u8; 32]);
        buf.extend_from_slice(&self.created.map_or([0; DATE_LEN], date::encode_date));
        buf.extend_from_slice(&self.modified.map_or([0; DATE_LEN], date::encode_date));
        buf.extend_from_slice(&self.name_script.to_be_bytes());
        buf.extend_from_slice(&u16::try_from(name.len()).unwrap_or(u16::MAX).to_be_bytes());
        buf.extend_from_slice(&name);
        buf.extend_from_slice(&u16::try_from(comment.len()).unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(&comment);
        buf
    }
}

/// Total channel bytes of a flattened file with the given fork sizes.
#[must_use]
pub fn flattened_size(info_len: u64, data_len: u64, macr_len: Option<u64>) -> u64 {
    let envelope = ENVELOPE_LEN as u64;
    let per_fork = FORK_HEADER_LEN as u64;
    let base = envelope + per_fork + info_len + per_fork + data_len;
    macr_len.map_or(base, |len| base + per_fork + len)
}
