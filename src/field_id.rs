#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// Error text accompanying a failed reply.
    ErrorText,
    /// General-purpose data payload (chat text, article bodies, banners).
    Data,
    /// Display name of a user.
    UserName,
    /// Numeric id of a connected user.
    UserId,
    /// Icon id chosen by a user.
    UserIconId,
    /// Login name for an account (XOR-obfuscated on the wire).
    Login,
    /// Password for an account (XOR-obfuscated on the wire).
    Password,
    /// Server-issued transfer reference number.
    ReferenceNumber,
    /// Total byte count of a transfer.
    TransferSize,
    /// Chat options (1 announces the message).
    ChatOptions,
    /// Access privilege bitmap (8 bytes).
    UserAccess,
    /// Per-user status flags (admin, idle, refuses messages).
    UserFlags,
    /// Client option flags sent at login and via user-info updates.
    Options,
    /// Sentinel marking that the server has no agreement text.
    NoServerAgreement,
    /// Client or server version number.
    Version,
    /// Server display name.
    ServerName,
    /// Packed file record in file listings.
    FileNameWithInfo,
    /// Bare file name.
    FileName,
    /// Encoded file path list.
    FilePath,
    /// File transfer options (2 requests a preview).
    FileTransferOptions,
    /// Four-character file type string.
    FileTypeString,
    /// Four-character file creator string.
    FileCreatorString,
    /// File size in bytes.
    FileSize,
    /// File creation date.
    FileCreateDate,
    /// File modification date.
    FileModifyDate,
    /// File comment text.
    FileComment,
    /// Replacement name for a rename operation.
    FileNewName,
    /// Numeric file type.
    FileType,
    /// Automatic response text for refused private messages.
    AutomaticResponse,
    /// Item count of a folder transfer.
    FolderItemCount,
    /// Packed user record in user listings.
    UserNameWithInfo,
    /// 16-byte GUID of a news category.
    NewsCategoryGuid,
    /// Name of a news category.
    NewsCategoryName,
    /// Packed news category entry in category listings.
    NewsCategory,
    /// Path into the news hierarchy.
    NewsPath,
    /// Numeric id of a news article.
    NewsArticleId,
    /// MIME flavor of a news article body.
    NewsArticleFlavor,
    /// Title of a news article.
    NewsArticleTitle,
    /// Poster of a news article.
    NewsArticlePoster,
    /// Posting date of a news article.
    NewsArticleDate,
    /// Previous sibling article id.
    NewsArticlePrev,
    /// Next sibling article id.
    NewsArticleNext,
    /// News article body.
    NewsArticleData,
    /// News article flags.
    NewsArticleFlags,
    /// Parent article id.
    NewsArticleParent,
    /// First child article id.
    NewsArticleFirstChild,
    /// Any other field id not explicitly covered.
    Other(u16),
}

impl From<u16> for FieldId {
    fn from(v: u16) -> Self {
        match v {
            100 => Self::ErrorText,
            101 => Self::Data,
            102 => Self::UserName,
            103 => Self::UserId,
            104 => Self::UserIconId,
            105 => Self::Login,
            106 => Self::Password,
            107 => Self::ReferenceNumber,
            108 => Self::TransferSize,
            109 => Self::ChatOptions,
            110 => Self::UserAccess,
            112 => Self::UserFlags,
            113 => Self::Options,
            152 => Self::NoServerAgreement,
            160 => Self::Version,
            162 => Self::ServerName,
            200 => Self::FileNameWithInfo,
            201 => Self::FileName,
            202 => Self::FilePath,
            204 => Self::FileTransferOptions,
            205 => Self::FileTypeString,
            206 => Self::FileCreatorString,
            207 => Self::FileSize,
            208 => Self::FileCreateDate,
            209 => Self::FileModifyDate,
            210 => Self::FileComment,
            211 => Self::FileNewName,
            213 => Self::FileType,
            215 => Self::AutomaticResponse,
            220 => Self::FolderItemCount,
            300 => Self::UserNameWithInfo,
            319 => Self::NewsCategoryGuid,
            322 => Self::NewsCategoryName,
            323 => Self::NewsCategory,
            325 => Self::NewsPath,
            326 => Self::NewsArticleId,
            327 => Self::NewsArticleFlavor,
            328 => Self::NewsArticleTitle,
            329 => Self::NewsArticlePoster,
            330 => Self::NewsArticleDate,
            331 => Self::NewsArticlePrev,
            332 => Self::NewsArticleNext,
            333 => Self::NewsArticleData,
            334 => Self::NewsArticleFlags,
            335 => Self::NewsArticleParent,
            336 => Self::NewsArticleFirstChild,
            other => Self::Other(other),
        }
    }
}

impl From<FieldId> for u16 {
    fn from(f: FieldId) -> Self {
        match f {
            FieldId::ErrorText => 100,
            FieldId::Data => 101,
            FieldId::UserName => 102,
            FieldId::UserId => 103,
            FieldId::UserIconId => 104,
            FieldId::Login => 105,
            FieldId::Password => 106,
            FieldId::ReferenceNumber => 107,
            FieldId::TransferSize => 108,
            FieldId::ChatOptions => 109,
            FieldId::UserAccess => 110,
            FieldId::UserFlags => 112,
            FieldId::Options => 113,
            FieldId::NoServerAgreement => 152,
            FieldId::Version => 160,
            FieldId::ServerName => 162,
            FieldId::FileNameWithInfo => 200,
            FieldId::FileName => 201,
            FieldId::FilePath => 202,
            FieldId::FileTransferOptions => 204,
            FieldId::FileTypeString => 205,
            FieldId::FileCreatorString => 206,
            FieldId::FileSize => 207,
            FieldId::FileCreateDate => 208,
            FieldId::FileModifyDate => 209,
            FieldId::FileComment => 210,
            FieldId::FileNewName => 211,
            FieldId::FileType => 213,
            FieldId::AutomaticResponse => 215,
            FieldId::FolderItemCount => 220,
            FieldId::UserNameWithInfo => 300,
            FieldId::NewsCategoryGuid => 319,
            FieldId::NewsCategoryName => 322,
            FieldId::NewsCategory => 323,
            FieldId::NewsPath => 325,
            FieldId::NewsArticleId => 326,
            FieldId::NewsArticleFlavor => 327,
            FieldId::NewsArticleTitle => 328,
            FieldId::NewsArticlePoster => 329,
            FieldId::NewsArticleDate => 330,
            FieldId::NewsArticlePrev => 331,
            FieldId::NewsArticleNext => 332,
            FieldId::NewsArticleData => 333,
            FieldId::NewsArticleFlags => 334,
            FieldId::NewsArticleParent => 335,
            FieldId::NewsArticleFirstChild => 336,
            FieldId::Other(v) => v,
        }
    }
}

impl std::fmt::Display for FieldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(v) => write!(f, "Other({v})"),
            known => write!(f, "{known:?}"),
        }
    }
}
