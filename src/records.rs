//! Packed wire records carried inside transaction fields.
//!
//! Listings do not use nested parameter blocks; they pack records directly
//! into field bytes. This module decodes (and, for the emitting side of
//! tests and uploads, encodes) path lists, user records, file records, news
//! category entries, article lists, and the folder-transfer item headers.
//! Layouts are catalogued in `docs/protocol.md`.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use chrono::NaiveDateTime;

use crate::{
    date::{self, DATE_LEN},
    macroman,
    transaction::TransactionError,
    user_flags::UserFlags,
};

/// Four-character type or creator code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// The folder type code in file listings.
    pub const FOLDER: Self = Self(*b"fldr");
    /// Placeholder code for files without platform metadata.
    pub const UNKNOWN: Self = Self(*b"????");
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            let c = char::from(b);
            if c.is_ascii_graphic() || c == ' ' {
                write!(f, "{c}")?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// Sequential reader over a packed record buffer.
#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) const fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    pub(crate) const fn remaining(&self) -> usize { self.buf.len() - self.pos }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], TransactionError> {
        let out = self
            .buf
            .get(self.pos..self.pos + n)
            .ok_or(TransactionError::ShortBuffer)?;
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, TransactionError> {
        self.take(1).map(|b| b.first().copied().unwrap_or(0))
    }

    pub(crate) fn u16(&mut self) -> Result<u16, TransactionError> {
        self.take(2)
            .map(|b| u16::from_be_bytes(b.try_into().unwrap_or([0; 2])))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, TransactionError> {
        self.take(4)
            .map(|b| u32::from_be_bytes(b.try_into().unwrap_or([0; 4])))
    }
}

/// Encode an absolute server path as a wire path list.
///
/// # Errors
/// Returns [`TransactionError::PayloadTooLarge`] if a segment exceeds 255
/// bytes or the segment count exceeds `u16::MAX`.
#[must_use = "use the encoded bytes"]
pub fn encode_path(segments: &[String]) -> Result<Vec<u8>, TransactionError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(
        &u16::try_from(segments.len())
            .map_err(|_| TransactionError::PayloadTooLarge)?
            .to_be_bytes(),
    );
    for segment in segments {
        let bytes = macroman::encode_text(segment);
        let len = u8::try_from(bytes.len()).map_err(|_| TransactionError::PayloadTooLarge)?;
        buf.extend_from_slice(&[0, 0, len]);
        buf.extend_from_slice(&bytes);
    }
    Ok(buf)
}

/// Decode a wire path list into its segments.
///
/// # Errors
/// Returns an error if the buffer is truncated or carries trailing bytes.
#[must_use = "handle the result"]
pub fn decode_path(buf: &[u8]) -> Result<Vec<String>, TransactionError> {
    let mut rdr = ByteReader::new(buf);
    let count = rdr.u16()?;
    let mut segments = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        rdr.take(2)?; // reserved
        let len = rdr.u8()?;
        segments.push(macroman::decode_text(rdr.take(usize::from(len))?));
    }
    if rdr.remaining() != 0 {
        return Err(TransactionError::SizeMismatch);
    }
    Ok(segments)
}

/// A connected user from a user listing or change notification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct UserInfo {
    /// Server-assigned user id.
    pub id: u16,
    /// Icon id.
    pub icon: u16,
    /// Status flags.
    #[serde(skip)]
    pub flags: UserFlags,
    /// Display name.
    pub name: String,
}

impl UserInfo {
    /// Parse a packed `UserNameWithInfo` record.
    ///
    /// # Errors
    /// Returns an error if the record is truncated.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8]) -> Result<Self, TransactionError> {
        let mut rdr = ByteReader::new(buf);
        let id = rdr.u16()?;
        let icon = rdr.u16()?;
        let flags = UserFlags::from_bits_truncate(rdr.u16()?);
        let len = rdr.u16()?;
        let name = macroman::decode_text(rdr.take(usize::from(len))?);
        Ok(Self {
            id,
            icon,
            flags,
            name,
        })
    }

    /// Encode as a packed `UserNameWithInfo` record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = macroman::encode_text(&self.name);
        let mut buf = Vec::with_capacity(8 + name.len());
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.icon.to_be_bytes());
        buf.extend_from_slice(&self.flags.bits().to_be_bytes());
        buf.extend_from_slice(&u16::try_from(name.len()).unwrap_or(u16::MAX).to_be_bytes());
        buf.extend_from_slice(&name);
        buf
    }
}

/// A file or folder from a file listing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileInfo {
    /// Four-character type code; `fldr` marks a folder.
    #[serde(skip)]
    pub type_code: FourCC,
    /// Four-character creator code.
    #[serde(skip)]
    pub creator: FourCC,
    /// Size in bytes, or contained item count for folders.
    pub size: u32,
    /// Script code of the name.
    pub name_script: u16,
    /// Display name.
    pub name: String,
}

impl FileInfo {
    /// Parse a packed `FileNameWithInfo` record.
    ///
    /// # Errors
    /// Returns an error if the record is truncated.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8]) -> Result<Self, TransactionError> {
        let mut rdr = ByteReader::new(buf);
        let type_code = FourCC(rdr.take(4)?.try_into().unwrap_or([0; 4]));
        let creator = FourCC(rdr.take(4)?.try_into().unwrap_or([0; 4]));
        let size = rdr.u32()?;
        rdr.u32()?; // reserved
        let name_script = rdr.u16()?;
        let len = rdr.u16()?;
        let name = macroman::decode_text(rdr.take(usize::from(len))?);
        Ok(Self {
            type_code,
            creator,
            size,
            name_script,
            name,
        })
    }

    /// Encode as a packed `FileNameWithInfo` record.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = macroman::encode_text(&self.name);
        let mut buf = Vec::with_capacity(20 + name.len());
        buf.extend_from_slice(&self.type_code.0);
        buf.extend_from_slice(&self.creator.0);
        buf.extend_from_slice(&self.size.to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&self.name_script.to_be_bytes());
        buf.extend_from_slice(&u16::try_from(name.len()).unwrap_or(u16::MAX).to_be_bytes());
        buf.extend_from_slice(&name);
        buf
    }

    /// Whether this entry names a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool { self.type_code == FourCC::FOLDER }
}

/// Kind of a news category entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsCategoryKind {
    /// A bundle grouping further categories.
    Bundle,
    /// A category holding articles.
    Category,
}

/// A news bundle or category from a category listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsCategory {
    /// Entry kind.
    pub kind: NewsCategoryKind,
    /// Number of contained items.
    pub count: u16,
    /// Display name.
    pub name: String,
    /// Category GUID, present on category entries.
    pub guid: Option<[u8; 16]>,
}

impl NewsCategory {
    /// Parse a packed news category entry.
    ///
    /// # Errors
    /// Returns an error if the record is truncated or the kind is unknown.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8]) -> Result<Self, TransactionError> {
        let mut rdr = ByteReader::new(buf);
        let kind = match rdr.u16()? {
            2 => NewsCategoryKind::Bundle,
            3 => NewsCategoryKind::Category,
            _ => return Err(TransactionError::SizeMismatch),
        };
        let count = rdr.u16()?;
        let len = rdr.u8()?;
        let name = macroman::decode_text(rdr.take(usize::from(len))?);
        let guid = if rdr.remaining() >= 16 {
            Some(rdr.take(16)?.try_into().unwrap_or([0; 16]))
        } else {
            None
        };
        Ok(Self {
            kind,
            count,
            name,
            guid,
        })
    }

    /// Encode as a packed news category entry.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = macroman::encode_text(&self.name);
        let mut buf = Vec::new();
        let kind: u16 = match self.kind {
            NewsCategoryKind::Bundle => 2,
            NewsCategoryKind::Category => 3,
        };
        buf.extend_from_slice(&kind.to_be_bytes());
        buf.extend_from_slice(&self.count.to_be_bytes());
        buf.push(u8::try_from(name.len()).unwrap_or(u8::MAX));
        buf.extend_from_slice(&name);
        if let Some(guid) = self.guid {
            buf.extend_from_slice(&guid);
        }
        buf
    }
}

/// One body flavor of a news article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsFlavor {
    /// MIME type, typically `text/plain`.
    pub mime: String,
    /// Size of the article body in this flavor.
    pub size: u16,
}

/// A news article from an article listing.
///
/// Threading is flat: the record carries sibling and parent ids and child
/// lists are computed by the caller on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsArticle {
    /// Article id within its category.
    pub id: u32,
    /// Title.
    pub title: String,
    /// Poster name.
    pub poster: String,
    /// Posting date.
    pub date: Option<NaiveDateTime>,
    /// Previous sibling id (0 = none).
    pub prev: u32,
    /// Next sibling id (0 = none).
    pub next: u32,
    /// Parent article id (0 = root).
    pub parent: u32,
    /// First child id (0 = none).
    pub first_child: u32,
    /// Available body flavors.
    pub flavors: Vec<NewsFlavor>,
}

/// Parse the packed article-list stream of a category.
///
/// # Errors
/// Returns an error if the stream is truncated or over-long.
#[must_use = "handle the result"]
pub fn parse_article_list(buf: &[u8]) -> Result<Vec<NewsArticle>, TransactionError> {
    let mut rdr = ByteReader::new(buf);
    let count = rdr.u32()?;
    let mut articles = Vec::new();
    for _ in 0..count {
        let id = rdr.u32()?;
        let title_len = rdr.u8()?;
        let title = macroman::decode_text(rdr.take(usize::from(title_len))?);
        let poster_len = rdr.u8()?;
        let poster = macroman::decode_text(rdr.take(usize::from(poster_len))?);
        let article_date = date::decode_date(rdr.take(DATE_LEN)?)?;
        let prev = rdr.u32()?;
        let next = rdr.u32()?;
        let parent = rdr.u32()?;
        let first_child = rdr.u32()?;
        let flavor_count = rdr.u8()?;
        let mut flavors = Vec::with_capacity(usize::from(flavor_count));
        for _ in 0..flavor_count {
            let mime_len = rdr.u8()?;
            let mime = macroman::decode_text(rdr.take(usize::from(mime_len))?);
            let size = rdr.u16()?;
            flavors.push(NewsFlavor { mime, size });
        }
        articles.push(NewsArticle {
            id,
            title,
            poster,
            date: article_date,
            prev,
            next,
            parent,
            first_child,
            flavors,
        });
    }
    if rdr.remaining() != 0 {
        return Err(TransactionError::SizeMismatch);
    }
    Ok(articles)
}

/// Encode an article-list stream.
///
/// # Errors
/// Returns [`TransactionError::PayloadTooLarge`] if any string exceeds its
/// length prefix.
#[must_use = "use the encoded bytes"]
pub fn encode_article_list(articles: &[NewsArticle]) -> Result<Vec<u8>, TransactionError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(
        &u32::try_from(articles.len())
            .map_err(|_| TransactionError::PayloadTooLarge)?
            .to_be_bytes(),
    );
    for article in articles {
        buf.extend_from_slice(&article.id.to_be_bytes());
        push_short_string(&mut buf, &article.title)?;
        push_short_string(&mut buf, &article.poster)?;
        let encoded_date = article.date.map_or([0u8; DATE_LEN], date::encode_date);
        buf.extend_from_slice(&encoded_date);
        buf.extend_from_slice(&article.prev.to_be_bytes());
        buf.extend_from_slice(&article.next.to_be_bytes());
        buf.extend_from_slice(&article.parent.to_be_bytes());
        buf.extend_from_slice(&article.first_child.to_be_bytes());
        buf.push(u8::try_from(article.flavors.len()).map_err(|_| TransactionError::PayloadTooLarge)?);
        for flavor in &article.flavors {
            push_short_string(&mut buf, &flavor.mime)?;
            buf.extend_from_slice(&flavor.size.to_be_bytes());
        }
    }
    Ok(buf)
}

fn push_short_string(buf: &mut Vec<u8>, text: &str) -> Result<(), TransactionError> {
    let bytes = macroman::encode_text(text);
    let len = u8::try_from(bytes.len()).map_err(|_| TransactionError::PayloadTooLarge)?;
    buf.push(len);
    buf.extend_from_slice(&bytes);
    Ok(())
}

/// Kind of a folder-transfer item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderItemKind {
    /// A regular file.
    File,
    /// A directory.
    Folder,
}

/// One item announced on a folder-transfer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderItem {
    /// Item kind.
    pub kind: FolderItemKind,
    /// Path components relative to the transfer root.
    pub path: Vec<String>,
}

impl FolderItem {
    /// Encode the item header, including its leading `u16` length prefix.
    ///
    /// # Errors
    /// Returns an error if a path component exceeds 255 bytes.
    #[must_use = "use the encoded bytes"]
    pub fn encode(&self) -> Result<Vec<u8>, TransactionError> {
        let mut body = Vec::new();
        let kind: u16 = match self.kind {
            FolderItemKind::File => 0,
            FolderItemKind::Folder => 1,
        };
        body.extend_from_slice(&kind.to_be_bytes());
        body.extend_from_slice(
            &u16::try_from(self.path.len())
                .map_err(|_| TransactionError::PayloadTooLarge)?
                .to_be_bytes(),
        );
        for component in &self.path {
            let bytes = macroman::encode_text(component);
            let len = u8::try_from(bytes.len()).map_err(|_| TransactionError::PayloadTooLarge)?;
            body.extend_from_slice(&[0, 0, len]);
            body.extend_from_slice(&bytes);
        }
        let mut buf = Vec::with_capacity(2 + body.len());
        buf.extend_from_slice(
            &u16::try_from(body.len())
                .map_err(|_| TransactionError::PayloadTooLarge)?
                .to_be_bytes(),
        );
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Parse an item header body (the bytes after the length prefix).
    ///
    /// # Errors
    /// Returns an error if the header is truncated or names an unknown kind.
    #[must_use = "handle the result"]
    pub fn parse(buf: &[u8]) -> Result<Self, TransactionError> {
        let mut rdr = ByteReader::new(buf);
        let kind = match rdr.u16()? {
            0 => FolderItemKind::File,
            1 => FolderItemKind::Folder,
            _ => return Err(TransactionError::SizeMismatch),
        };
        let count = rdr.u16()?;
        let mut path = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            rdr.take(2)?; // reserved
            let len = rdr.u8()?;
            path.push(macroman::decode_text(rdr.take(usize::from(len))?));
        }
        Ok(Self { kind, path })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[test]
    fn path_list_round_trips() {
        let segments = vec!["Docs".to_owned(), "caf\u{E9}".to_owned()];
        let wire = encode_path(&segments).unwrap();
        assert_eq!(decode_path(&wire).unwrap(), segments);
    }

    #[test]
    fn empty_path_is_two_bytes() {
        let wire = encode_path(&[]).unwrap();
        assert_eq!(wire, vec![0, 0]);
        assert!(decode_path(&wire).unwrap().is_empty());
    }

    #[test]
    fn overlong_segment_is_rejected() {
        let segment = "x".repeat(256);
        assert!(encode_path(&[segment]).is_err());
    }

    #[test]
    fn user_record_round_trips() {
        let user = UserInfo {
            id: 3,
            icon: 414,
            flags: UserFlags::ADMIN | UserFlags::IDLE,
            name: "Alice".to_owned(),
        };
        assert_eq!(UserInfo::parse(&user.encode()).unwrap(), user);
    }

    #[rstest]
    #[case(FourCC::FOLDER, true)]
    #[case(FourCC(*b"TEXT"), false)]
    fn folder_detection(#[case] type_code: FourCC, #[case] folder: bool) {
        let file = FileInfo {
            type_code,
            creator: FourCC::UNKNOWN,
            size: 3,
            name_script: 0,
            name: "Docs".to_owned(),
        };
        assert_eq!(file.is_folder(), folder);
        assert_eq!(FileInfo::parse(&file.encode()).unwrap(), file);
    }

    #[test]
    fn category_entry_with_guid_round_trips() {
        let category = NewsCategory {
            kind: NewsCategoryKind::Category,
            count: 12,
            name: "General".to_owned(),
            guid: Some([7; 16]),
        };
        assert_eq!(NewsCategory::parse(&category.encode()).unwrap(), category);
    }

    #[test]
    fn bundle_entry_without_guid_round_trips() {
        let bundle = NewsCategory {
            kind: NewsCategoryKind::Bundle,
            count: 2,
            name: "Archive".to_owned(),
            guid: None,
        };
        assert_eq!(NewsCategory::parse(&bundle.encode()).unwrap(), bundle);
    }

    #[test]
    fn article_list_round_trips() {
        let articles = vec![
            NewsArticle {
                id: 1,
                title: "hello".to_owned(),
                poster: "alice".to_owned(),
                date: None,
                prev: 0,
                next: 2,
                parent: 0,
                first_child: 2,
                flavors: vec![NewsFlavor {
                    mime: "text/plain".to_owned(),
                    size: 64,
                }],
            },
            NewsArticle {
                id: 2,
                title: "re: hello".to_owned(),
                poster: "bob".to_owned(),
                date: None,
                prev: 1,
                next: 0,
                parent: 1,
                first_child: 0,
                flavors: Vec::new(),
            },
        ];
        let wire = encode_article_list(&articles).unwrap();
        assert_eq!(parse_article_list(&wire).unwrap(), articles);
    }

    #[test]
    fn truncated_article_list_is_rejected() {
        let wire = encode_article_list(&[NewsArticle {
            id: 1,
            title: "t".to_owned(),
            poster: "p".to_owned(),
            date: None,
            prev: 0,
            next: 0,
            parent: 0,
            first_child: 0,
            flavors: Vec::new(),
        }])
        .unwrap();
        assert!(parse_article_list(&wire[..wire.len() - 2]).is_err());
    }

    #[test]
    fn folder_item_header_round_trips() {
        let item = FolderItem {
            kind: FolderItemKind::File,
            path: vec!["a".to_owned(), "1.txt".to_owned()],
        };
        let wire = item.encode().unwrap();
        let (len_bytes, body) = wire.split_at(2);
        let len = u16::from_be_bytes(len_bytes.try_into().unwrap());
        assert_eq!(usize::from(len), body.len());
        assert_eq!(FolderItem::parse(body).unwrap(), item);
    }

    proptest! {
        #[test]
        fn path_lists_are_idempotent(
            segments in proptest::collection::vec("[a-zA-Z0-9 ._-]{1,32}", 0..8)
        ) {
            let wire = encode_path(&segments).unwrap();
            prop_assert_eq!(decode_path(&wire).unwrap(), segments);
        }
    }
}
