#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionType {
    /// Reply carrying only an error code and optional error text.
    Error,
    /// Fetch the message board contents.
    GetMessageBoard,
    /// Unsolicited message-board post notification.
    NewMessage,
    /// Post to the message board.
    PostMessageBoard,
    /// Unsolicited server or private message.
    ServerMessage,
    /// Send a chat line.
    SendChat,
    /// Unsolicited chat line.
    ChatMessage,
    /// Authenticate a session.
    Login,
    /// Send an instant message to a user.
    SendInstantMessage,
    /// Unsolicited agreement text that must be acknowledged.
    ShowAgreement,
    /// Server-initiated disconnection notice.
    DisconnectMessage,
    /// Acknowledge the server agreement.
    Agreed,
    /// Fetch the file listing for a path.
    GetFileNameList,
    /// Request a file download reference.
    DownloadFile,
    /// Request a file upload reference.
    UploadFile,
    /// Delete a file or folder.
    DeleteFile,
    /// Create a folder.
    NewFolder,
    /// Fetch metadata for a file.
    GetFileInfo,
    /// Update metadata for a file.
    SetFileInfo,
    /// Request a folder download reference.
    DownloadFolder,
    /// Request the server banner.
    DownloadBanner,
    /// Request a folder upload reference.
    UploadFolder,
    /// Fetch the connected-user list.
    GetUserNameList,
    /// Unsolicited user join or change notification.
    NotifyChangeUser,
    /// Unsolicited user departure notification.
    NotifyDeleteUser,
    /// Fetch the info text for a user.
    GetClientInfoText,
    /// Update this session's display name, icon, and options.
    SetClientUserInfo,
    /// Fetch all accounts (admin).
    ListUsers,
    /// Create an account (admin).
    NewUser,
    /// Delete an account (admin).
    DeleteUser,
    /// Fetch an account (admin).
    GetUser,
    /// Update an account (admin).
    SetUser,
    /// Unsolicited access privilege update.
    UserAccess,
    /// Broadcast a message to all users (admin).
    UserBroadcast,
    /// Fetch news category names at a path.
    GetNewsCategoryNameList,
    /// Fetch article titles within a category.
    GetNewsArticleNameList,
    /// Fetch a specific article body.
    GetNewsArticleData,
    /// Post a news article.
    PostNewsArticle,
    /// Connection keep-alive.
    KeepAlive,
    /// Any other transaction type not explicitly covered.
    Other(u16),
}

impl From<u16> for TransactionType {
    fn from(v: u16) -> Self {
        match v {
            100 => Self::Error,
            101 => Self::GetMessageBoard,
            102 => Self::NewMessage,
            103 => Self::PostMessageBoard,
            104 => Self::ServerMessage,
            105 => Self::SendChat,
            106 => Self::ChatMessage,
            107 => Self::Login,
            108 => Self::SendInstantMessage,
            109 => Self::ShowAgreement,
            111 => Self::DisconnectMessage,
            121 => Self::Agreed,
            200 => Self::GetFileNameList,
            202 => Self::DownloadFile,
            203 => Self::UploadFile,
            204 => Self::DeleteFile,
            205 => Self::NewFolder,
            206 => Self::GetFileInfo,
            207 => Self::SetFileInfo,
            210 => Self::DownloadFolder,
            212 => Self::DownloadBanner,
            213 => Self::UploadFolder,
            300 => Self::GetUserNameList,
            301 => Self::NotifyChangeUser,
            302 => Self::NotifyDeleteUser,
            303 => Self::GetClientInfoText,
            304 => Self::SetClientUserInfo,
            348 => Self::ListUsers,
            350 => Self::NewUser,
            351 => Self::DeleteUser,
            352 => Self::GetUser,
            353 => Self::SetUser,
            354 => Self::UserAccess,
            355 => Self::UserBroadcast,
            370 => Self::GetNewsCategoryNameList,
            371 => Self::GetNewsArticleNameList,
            400 => Self::GetNewsArticleData,
            410 => Self::PostNewsArticle,
            500 => Self::KeepAlive,
            other => Self::Other(other),
        }
    }
}

impl From<TransactionType> for u16 {
    fn from(t: TransactionType) -> Self {
        match t {
            TransactionType::Error => 100,
            TransactionType::GetMessageBoard => 101,
            TransactionType::NewMessage => 102,
            TransactionType::PostMessageBoard => 103,
            TransactionType::ServerMessage => 104,
            TransactionType::SendChat => 105,
            TransactionType::ChatMessage => 106,
            TransactionType::Login => 107,
            TransactionType::SendInstantMessage => 108,
            TransactionType::ShowAgreement => 109,
            TransactionType::DisconnectMessage => 111,
            TransactionType::Agreed => 121,
            TransactionType::GetFileNameList => 200,
            TransactionType::DownloadFile => 202,
            TransactionType::UploadFile => 203,
            TransactionType::DeleteFile => 204,
            TransactionType::NewFolder => 205,
            TransactionType::GetFileInfo => 206,
            TransactionType::SetFileInfo => 207,
            TransactionType::DownloadFolder => 210,
            TransactionType::DownloadBanner => 212,
            TransactionType::UploadFolder => 213,
            TransactionType::GetUserNameList => 300,
            TransactionType::NotifyChangeUser => 301,
            TransactionType::NotifyDeleteUser => 302,
            TransactionType::GetClientInfoText => 303,
            TransactionType::SetClientUserInfo => 304,
            TransactionType::ListUsers => 348,
            TransactionType::NewUser => 350,
            TransactionType::DeleteUser => 351,
            TransactionType::GetUser => 352,
            TransactionType::SetUser => 353,
            TransactionType::UserAccess => 354,
            TransactionType::UserBroadcast => 355,
            TransactionType::GetNewsCategoryNameList => 370,
            TransactionType::GetNewsArticleNameList => 371,
            TransactionType::GetNewsArticleData => 400,
            TransactionType::PostNewsArticle => 410,
            TransactionType::KeepAlive => 500,
            TransactionType::Other(v) => v,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(v) => write!(f, "Other({v})"),
            known => write!(f, "{known:?}"),
        }
    }
}
