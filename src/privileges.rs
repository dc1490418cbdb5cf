//! Access privilege bits granted by the server.
//!
//! The `UserAccess` transaction (and field 110 on admin account records)
//! carries an 8-byte bitmap of the operations this session may perform. The
//! client decodes the bitmap so callers can grey out functionality before
//! the server has a chance to refuse it; the server remains the authority
//! and refusals still surface as error replies.

use bitflags::bitflags;

bitflags! {
    /// Access privilege bitmap from field 110.
    ///
    /// Bit positions follow `docs/protocol.md`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Privileges: u64 {
        /// Delete files.
        const DELETE_FILE = 1 << 0;
        /// Upload files.
        const UPLOAD_FILE = 1 << 1;
        /// Download files and view listings.
        const DOWNLOAD_FILE = 1 << 2;
        /// Rename files.
        const RENAME_FILE = 1 << 3;
        /// Move files between folders.
        const MOVE_FILE = 1 << 4;
        /// Create folders.
        const CREATE_FOLDER = 1 << 5;
        /// Delete folders.
        const DELETE_FOLDER = 1 << 6;
        /// Rename folders.
        const RENAME_FOLDER = 1 << 7;
        /// Move folders.
        const MOVE_FOLDER = 1 << 8;
        /// Read chat.
        const READ_CHAT = 1 << 9;
        /// Send chat.
        const SEND_CHAT = 1 << 10;
        /// Open chat rooms.
        const OPEN_CHAT = 1 << 11;
        /// Close chat rooms.
        const CLOSE_CHAT = 1 << 12;
        /// Appear in the user list.
        const SHOW_IN_LIST = 1 << 13;
        /// Create accounts.
        const CREATE_USER = 1 << 14;
        /// Delete accounts.
        const DELETE_USER = 1 << 15;
        /// View account details.
        const OPEN_USER = 1 << 16;
        /// Modify accounts.
        const MODIFY_USER = 1 << 17;
        /// Change own password.
        const CHANGE_OWN_PASSWORD = 1 << 18;
        /// Send private messages.
        const SEND_PRIVATE_MESSAGE = 1 << 19;
        /// Read news articles.
        const NEWS_READ_ARTICLE = 1 << 20;
        /// Post news articles.
        const NEWS_POST_ARTICLE = 1 << 21;
        /// Disconnect other users.
        const DISCONNECT_USER = 1 << 22;
        /// Cannot be disconnected by others.
        const CANNOT_BE_DISCONNECTED = 1 << 23;
        /// View other users' info.
        const GET_CLIENT_INFO = 1 << 24;
        /// Upload to any folder.
        const UPLOAD_ANYWHERE = 1 << 25;
        /// Use any display name.
        const ANY_NAME = 1 << 26;
        /// Skip the server agreement.
        const NO_AGREEMENT = 1 << 27;
        /// Set file comments.
        const SET_FILE_COMMENT = 1 << 28;
        /// Set folder comments.
        const SET_FOLDER_COMMENT = 1 << 29;
        /// View drop box contents.
        const VIEW_DROP_BOXES = 1 << 30;
        /// Create aliases.
        const MAKE_ALIAS = 1 << 31;
        /// Send broadcasts.
        const BROADCAST = 1 << 32;
        /// Delete news articles.
        const NEWS_DELETE_ARTICLE = 1 << 33;
        /// Create news categories.
        const NEWS_CREATE_CATEGORY = 1 << 34;
        /// Delete news categories.
        const NEWS_DELETE_CATEGORY = 1 << 35;
        /// Create news bundles.
        const NEWS_CREATE_FOLDER = 1 << 36;
        /// Delete news bundles.
        const NEWS_DELETE_FOLDER = 1 << 37;
    }
}

impl Privileges {
    /// Decode the 8-byte wire bitmap, ignoring bits this client is unaware of.
    ///
    /// Shorter values are treated as the low-order tail of the bitmap.
    #[must_use]
    pub fn from_wire(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        let take = bytes.len().min(8);
        if let (Some(dst), Some(src)) = (raw.get_mut(8 - take..), bytes.get(..take)) {
            dst.copy_from_slice(src);
        }
        Self::from_bits_truncate(u64::from_be_bytes(raw))
    }

    /// Encode as the 8-byte wire bitmap.
    #[must_use]
    pub const fn to_wire(self) -> [u8; 8] { self.bits().to_be_bytes() }

    /// Whether any account-administration bit is set.
    #[must_use]
    pub const fn can_administer(self) -> bool {
        self.intersects(
            Self::CREATE_USER
                .union(Self::DELETE_USER)
                .union(Self::OPEN_USER)
                .union(Self::MODIFY_USER),
        )
    }
}
