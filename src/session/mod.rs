//! Control-channel session: handshake, login, request/reply, events.
//!
//! A [`Session`] owns exactly one control connection. A background receive
//! task holds the read half, routing replies to waiting requesters by
//! transaction id and translating unsolicited frames into [`ServerEvent`]s.
//! Writes are serialised through a mutex on the write half, so the server
//! observes requests in the order callers issued them. A keep-alive task
//! starts after login and keeps NAT state warm on quiet connections.

pub mod error;
pub mod event;
mod pending;

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use futures_util::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

pub use self::{
    error::SessionError,
    event::{DisconnectReason, EventStream, ServerEvent, SessionStatus},
};
use self::pending::PendingReplies;
use crate::{
    config::ClientConfig,
    field_id::FieldId,
    macroman,
    privileges::Privileges,
    protocol::{
        self, CLIENT_VERSION, HANDSHAKE_REPLY_LEN, HandshakeError,
    },
    records::{self, FileInfo, NewsArticle, NewsCategory, UserInfo},
    transaction::{
        ParamList, Params, Transaction, TransactionCodec,
    },
    transaction_type::TransactionType,
    transport,
    user_flags::ClientOptions,
};

/// Buffered events between the receive task and a slow consumer.
const EVENT_BUFFER: usize = 64;
/// Idle time after which the keep-alive task sends an early heartbeat.
const KEEP_ALIVE_IDLE: Duration = Duration::from_secs(150);
/// Polling granularity of the keep-alive task.
const KEEP_ALIVE_TICK: Duration = Duration::from_secs(15);
/// Server versions from here on understand the dedicated keep-alive
/// transaction; older ones get a benign user-list request instead.
const KEEP_ALIVE_MIN_VERSION: u16 = 185;

/// Name and version reported by the server at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server display name, absent on old servers.
    pub name: Option<String>,
    /// Server version number (0 when not reported).
    pub version: u16,
}

/// Server-issued handle for a transfer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRef {
    /// Reference number to present on the transfer channel.
    pub reference: u32,
    /// Total transfer size in bytes.
    pub size: u32,
    /// Item count, present for folder transfers.
    pub item_count: Option<u16>,
}

/// Metadata for a single file, from `GetFileInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
    /// File name.
    pub name: String,
    /// Four-character type string.
    pub type_str: Option<String>,
    /// Four-character creator string.
    pub creator_str: Option<String>,
    /// Size in bytes.
    pub size: Option<u32>,
    /// Comment attached to the file.
    pub comment: Option<String>,
    /// Creation date.
    pub created: Option<chrono::NaiveDateTime>,
    /// Modification date.
    pub modified: Option<chrono::NaiveDateTime>,
}

/// An account record, from the admin operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Login name.
    pub login: String,
    /// Display name.
    pub name: Option<String>,
    /// Granted privileges.
    pub access: Privileges,
}

/// A news article body, from `GetNewsArticleData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleData {
    /// Article title.
    pub title: Option<String>,
    /// Poster name.
    pub poster: Option<String>,
    /// Body text, rendered with `\n` line breaks.
    pub text: String,
}

/// Shared state between the session handle and its background tasks.
struct SessionShared {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingReplies,
    next_id: AtomicU32,
    state: Mutex<SessionStatus>,
    events: Mutex<Option<mpsc::Sender<ServerEvent>>>,
    last_frame: Mutex<Instant>,
    server: Mutex<Option<ServerInfo>>,
    config: ClientConfig,
}

impl SessionShared {
    fn lock_state(&self) -> SessionStatus {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn event_sender(&self) -> Option<mpsc::Sender<ServerEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    async fn send_event(&self, event: ServerEvent) {
        if let Some(tx) = self.event_sender() {
            let _: Result<_, _> = tx.send(event).await;
        }
    }

    /// Best-effort event emission for teardown paths that must not block.
    fn send_event_now(&self, event: ServerEvent) {
        if let Some(tx) = self.event_sender() {
            let _: Result<_, _> = tx.try_send(event);
        }
    }

    async fn set_state(&self, status: SessionStatus) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = status;
        self.send_event(ServerEvent::StatusChanged(status)).await;
    }

    fn set_state_now(&self, status: SessionStatus) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = status;
        self.send_event_now(ServerEvent::StatusChanged(status));
    }

    fn close_events(&self) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }

    fn touch(&self) {
        *self
            .last_frame
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_frame
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .elapsed()
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

/// Removes a pending entry when a requester stops waiting.
///
/// Completed ids are already gone from the map, so the removal is a no-op on
/// the happy path; it matters for timeouts and dropped futures.
struct PendingGuard<'a> {
    pending: &'a PendingReplies,
    id: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) { self.pending.remove(self.id); }
}

/// Allocate an id, write the request, and await the correlated reply.
async fn send_request(
    shared: &SessionShared,
    ty: TransactionType,
    payload: Vec<u8>,
) -> Result<Transaction, SessionError> {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let tx = Transaction::request(ty.into(), id, payload)?;
    let rx = shared.pending.insert(id)?;
    let guard = PendingGuard {
        pending: &shared.pending,
        id,
    };
    let bytes = tx.to_bytes();
    {
        let mut writer = shared.writer.lock().await;
        transport::write_all_timeout(&mut *writer, &bytes, shared.config.reply_timeout()).await?;
    }
    let outcome = match timeout(shared.config.reply_timeout(), rx).await {
        Err(_) => Err(SessionError::Timeout),
        Ok(Err(_)) => Err(SessionError::NotConnected),
        Ok(Ok(result)) => result,
    };
    drop(guard);
    outcome
}

/// Write a request that the server never replies to.
async fn send_notify(
    shared: &SessionShared,
    ty: TransactionType,
    payload: Vec<u8>,
) -> Result<(), SessionError> {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let tx = Transaction::request(ty.into(), id, payload)?;
    let bytes = tx.to_bytes();
    let mut writer = shared.writer.lock().await;
    transport::write_all_timeout(&mut *writer, &bytes, shared.config.reply_timeout()).await?;
    Ok(())
}

/// Decode a reply payload, surfacing a nonzero error code as
/// [`SessionError::Server`].
fn reply_params(tx: &Transaction) -> Result<Params, SessionError> {
    match Params::decode(&tx.payload) {
        Ok(params) => {
            if tx.header.error != 0 {
                return Err(SessionError::Server {
                    code: tx.header.error,
                    text: params
                        .first_str(FieldId::ErrorText)
                        .map(|t| macroman::render_line_breaks(&t)),
                });
            }
            Ok(params)
        }
        Err(err) => {
            if tx.header.error != 0 {
                return Err(SessionError::Server {
                    code: tx.header.error,
                    text: None,
                });
            }
            Err(err.into())
        }
    }
}

/// A logged-in (or logging-in) Hotline control session.
///
/// Created by [`Session::connect`]; destroyed by [`Session::disconnect`] or
/// drop. All pending requests fail with [`SessionError::NotConnected`] when
/// the session goes away.
pub struct Session {
    shared: Arc<SessionShared>,
    host: String,
    port: u16,
    receive_task: JoinHandle<()>,
    keep_alive_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open the control connection and perform the magic exchange.
    ///
    /// The returned [`EventStream`] is the single consumer of this session's
    /// events; status changes made during connection are already buffered on
    /// it.
    ///
    /// # Errors
    /// Returns [`SessionError::Handshake`] when the server refuses the
    /// exchange, or the underlying I/O or timeout error.
    pub async fn connect(
        host: impl Into<String>,
        port: u16,
        config: ClientConfig,
    ) -> Result<(Self, EventStream), SessionError> {
        let host = host.into();
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let _: Result<_, _> = event_tx
            .send(ServerEvent::StatusChanged(SessionStatus::Connecting))
            .await;
        let mut stream = transport::connect(&host, port, config.handshake_timeout()).await?;
        let _: Result<_, _> = event_tx
            .send(ServerEvent::StatusChanged(SessionStatus::Handshaking))
            .await;
        transport::write_all_timeout(
            &mut stream,
            &protocol::control_handshake(),
            config.handshake_timeout(),
        )
        .await?;
        let mut reply = [0u8; HANDSHAKE_REPLY_LEN];
        transport::read_exact_timeout(&mut stream, &mut reply, config.handshake_timeout()).await?;
        protocol::parse_control_reply(&reply).map_err(|err| match err {
            HandshakeError::Refused(code) => SessionError::Handshake(code),
            HandshakeError::InvalidProtocol => {
                SessionError::InvalidResponse("control handshake reply")
            }
        })?;
        let _: Result<_, _> = event_tx
            .send(ServerEvent::StatusChanged(SessionStatus::Connected))
            .await;

        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(SessionShared {
            writer: tokio::sync::Mutex::new(write_half),
            pending: PendingReplies::new(),
            next_id: AtomicU32::new(1),
            state: Mutex::new(SessionStatus::Connected),
            events: Mutex::new(Some(event_tx)),
            last_frame: Mutex::new(Instant::now()),
            server: Mutex::new(None),
            config,
        });
        let receive_task = tokio::spawn(receive_loop(read_half, Arc::clone(&shared)));
        info!(%host, port, "control connection established");
        Ok((
            Self {
                shared,
                host,
                port,
                receive_task,
                keep_alive_task: Mutex::new(None),
            },
            EventStream::new(event_rx),
        ))
    }

    /// Authenticate the session.
    ///
    /// An empty password is sent as an empty (still obfuscated) field, which
    /// is how guest accounts log in.
    ///
    /// # Errors
    /// Returns [`SessionError::LoginFailed`] when the server rejects the
    /// credentials, or any transport failure.
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        user_name: &str,
        icon_id: u16,
    ) -> Result<ServerInfo, SessionError> {
        if self.status() != SessionStatus::Connected {
            return Err(SessionError::NotConnected);
        }
        self.shared.set_state(SessionStatus::LoggingIn).await;
        let payload = self.params()
            .negated_str(FieldId::Login, login)
            .negated_str(FieldId::Password, password)
            .u16(FieldId::UserIconId, icon_id)
            .str(FieldId::UserName, user_name)
            .u16(FieldId::Version, CLIENT_VERSION)
            .encode()?;
        let reply = send_request(&self.shared, TransactionType::Login, payload).await;
        let params = match reply {
            Ok(tx) => match reply_params(&tx) {
                Ok(params) => params,
                Err(SessionError::Server { text, .. }) => {
                    self.shared.set_state(SessionStatus::Connected).await;
                    return Err(SessionError::LoginFailed(text));
                }
                Err(other) => {
                    self.shared.set_state(SessionStatus::Connected).await;
                    return Err(other);
                }
            },
            Err(err) => {
                if self.status() == SessionStatus::LoggingIn {
                    self.shared.set_state(SessionStatus::Connected).await;
                }
                return Err(err);
            }
        };
        let server = ServerInfo {
            name: params.first_str(FieldId::ServerName),
            version: params.first_u16(FieldId::Version).unwrap_or(0),
        };
        *self
            .shared
            .server
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(server.clone());
        self.shared.set_state(SessionStatus::LoggedIn).await;
        info!(server = ?server.name, version = server.version, "logged in");
        self.spawn_keep_alive();
        Ok(server)
    }

    fn spawn_keep_alive(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(keep_alive_loop(shared));
        *self
            .keep_alive_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus { self.shared.lock_state() }

    /// Server name and version recorded at login.
    #[must_use]
    pub fn server_info(&self) -> Option<ServerInfo> { self.shared.server_info() }

    /// Host this session is connected to.
    #[must_use]
    pub fn host(&self) -> &str { &self.host }

    /// Control port this session is connected to.
    #[must_use]
    pub const fn port(&self) -> u16 { self.port }

    /// Transfer port derived from the control port.
    #[must_use]
    pub fn transfer_port(&self) -> u16 { self.shared.config.transfer_port(self.port) }

    /// The configuration this session runs with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig { &self.shared.config }

    /// Parameter builder honouring the configured wire encoding.
    fn params(&self) -> ParamList {
        ParamList::new().with_encoding(self.shared.config.string_encoding)
    }

    /// Name + path parameter prefix shared by the file operations.
    fn file_target(&self, name: &str, path: &[String]) -> Result<ParamList, SessionError> {
        let mut list = self.params().str(FieldId::FileName, name);
        if !path.is_empty() {
            list = list.bytes(FieldId::FilePath, records::encode_path(path)?);
        }
        Ok(list)
    }

    fn ensure_logged_in(&self) -> Result<(), SessionError> {
        if self.status() == SessionStatus::LoggedIn {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn ensure_can_agree(&self) -> Result<(), SessionError> {
        matches!(
            self.status(),
            SessionStatus::Connected | SessionStatus::LoggedIn
        )
        .then_some(())
        .ok_or(SessionError::NotConnected)
    }

    async fn request(
        &self,
        ty: TransactionType,
        payload: Vec<u8>,
    ) -> Result<Params, SessionError> {
        self.ensure_logged_in()?;
        let tx = send_request(&self.shared, ty, payload).await?;
        reply_params(&tx)
    }

    // --- chat -----------------------------------------------------------

    /// Send a chat line. The server echoes it back as a `ChatMessage` event.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] outside the logged-in state,
    /// or any transport failure.
    pub async fn send_chat(&self, text: &str, announce: bool) -> Result<(), SessionError> {
        self.ensure_logged_in()?;
        let mut params = self.params().str(FieldId::Data, text);
        if announce {
            params = params.u16(FieldId::ChatOptions, 1);
        }
        send_notify(&self.shared, TransactionType::SendChat, params.encode()?).await
    }

    /// Broadcast a message to every connected user (requires the broadcast
    /// privilege).
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn send_broadcast(&self, text: &str) -> Result<(), SessionError> {
        let payload = self.params().str(FieldId::Data, text).encode()?;
        self.request(TransactionType::UserBroadcast, payload)
            .await
            .map(|_| ())
    }

    /// Send an instant message to a user.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn send_instant_message(
        &self,
        user_id: u16,
        text: &str,
    ) -> Result<(), SessionError> {
        let payload = self.params()
            .u16(FieldId::UserId, user_id)
            .u16(FieldId::Options, 1)
            .str(FieldId::Data, text)
            .encode()?;
        self.request(TransactionType::SendInstantMessage, payload)
            .await
            .map(|_| ())
    }

    // --- session --------------------------------------------------------

    /// Accept the server agreement, registering name, icon, and options.
    ///
    /// Permitted as soon as the handshake completes.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] before the handshake, or any
    /// transport failure.
    pub async fn send_agree(
        &self,
        user_name: &str,
        icon_id: u16,
        options: ClientOptions,
    ) -> Result<(), SessionError> {
        self.ensure_can_agree()?;
        let payload = self.params()
            .str(FieldId::UserName, user_name)
            .u16(FieldId::UserIconId, icon_id)
            .u16(FieldId::Options, options.bits())
            .encode()?;
        let tx = send_request(&self.shared, TransactionType::Agreed, payload).await?;
        reply_params(&tx).map(|_| ())
    }

    /// Update this session's display name, icon, options, and automatic
    /// response text.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] outside the logged-in state.
    pub async fn set_client_user_info(
        &self,
        user_name: &str,
        icon_id: u16,
        options: ClientOptions,
        auto_response: Option<&str>,
    ) -> Result<(), SessionError> {
        self.ensure_logged_in()?;
        let payload = self.params()
            .str(FieldId::UserName, user_name)
            .u16(FieldId::UserIconId, icon_id)
            .u16(FieldId::Options, options.bits())
            .maybe(
                FieldId::AutomaticResponse,
                auto_response.map(macroman::encode_text),
            )
            .encode()?;
        send_notify(&self.shared, TransactionType::SetClientUserInfo, payload).await
    }

    // --- users ----------------------------------------------------------

    /// Fetch the connected-user list.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidResponse`] on a malformed listing.
    pub async fn get_user_list(&self) -> Result<Vec<UserInfo>, SessionError> {
        let params = self
            .request(TransactionType::GetUserNameList, Vec::new())
            .await?;
        params
            .all(FieldId::UserNameWithInfo)
            .map(|raw| {
                UserInfo::parse(raw).map_err(|_| SessionError::InvalidResponse("user record"))
            })
            .collect()
    }

    /// Fetch the info text the server holds for a user.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn get_client_info_text(&self, user_id: u16) -> Result<String, SessionError> {
        let payload = self.params().u16(FieldId::UserId, user_id).encode()?;
        let params = self
            .request(TransactionType::GetClientInfoText, payload)
            .await?;
        params
            .first_str(FieldId::Data)
            .map(|t| macroman::render_line_breaks(&t))
            .ok_or(SessionError::InvalidResponse("client info text"))
    }

    // --- files ----------------------------------------------------------

    /// List files at an absolute path (empty path = shared root).
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidResponse`] on a malformed listing.
    pub async fn get_file_list(&self, path: &[String]) -> Result<Vec<FileInfo>, SessionError> {
        let mut list = self.params();
        if !path.is_empty() {
            list = list.bytes(FieldId::FilePath, records::encode_path(path)?);
        }
        let params = self
            .request(TransactionType::GetFileNameList, list.encode()?)
            .await?;
        params
            .all(FieldId::FileNameWithInfo)
            .map(|raw| {
                FileInfo::parse(raw).map_err(|_| SessionError::InvalidResponse("file record"))
            })
            .collect()
    }

    /// Fetch metadata for one file.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the file does not exist.
    pub async fn get_file_info(
        &self,
        name: &str,
        path: &[String],
    ) -> Result<FileDetails, SessionError> {
        let payload = self.file_target(name, path)?.encode()?;
        let params = self.request(TransactionType::GetFileInfo, payload).await?;
        Ok(FileDetails {
            name: params.first_str(FieldId::FileName).unwrap_or_else(|| name.to_owned()),
            type_str: params.first_str(FieldId::FileTypeString),
            creator_str: params.first_str(FieldId::FileCreatorString),
            size: params.first_u32(FieldId::FileSize),
            comment: params.first_str(FieldId::FileComment),
            created: params.first_date(FieldId::FileCreateDate),
            modified: params.first_date(FieldId::FileModifyDate),
        })
    }

    /// Rename a file and/or replace its comment.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn set_file_info(
        &self,
        name: &str,
        path: &[String],
        new_name: Option<&str>,
        comment: Option<&str>,
    ) -> Result<(), SessionError> {
        let payload = self.file_target(name, path)?
            .maybe(FieldId::FileNewName, new_name.map(macroman::encode_text))
            .maybe(FieldId::FileComment, comment.map(macroman::encode_text))
            .encode()?;
        self.request(TransactionType::SetFileInfo, payload)
            .await
            .map(|_| ())
    }

    /// Delete a file or folder.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn delete_file(&self, name: &str, path: &[String]) -> Result<(), SessionError> {
        let payload = self.file_target(name, path)?.encode()?;
        self.request(TransactionType::DeleteFile, payload)
            .await
            .map(|_| ())
    }

    /// Create a folder.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn new_folder(&self, name: &str, path: &[String]) -> Result<(), SessionError> {
        let payload = self.file_target(name, path)?.encode()?;
        self.request(TransactionType::NewFolder, payload)
            .await
            .map(|_| ())
    }

    // --- news -----------------------------------------------------------

    /// List news bundles and categories at a path.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidResponse`] on a malformed listing.
    pub async fn get_news_categories(
        &self,
        path: &[String],
    ) -> Result<Vec<NewsCategory>, SessionError> {
        let mut list = self.params();
        if !path.is_empty() {
            list = list.bytes(FieldId::NewsPath, records::encode_path(path)?);
        }
        let params = self
            .request(TransactionType::GetNewsCategoryNameList, list.encode()?)
            .await?;
        params
            .all(FieldId::NewsCategory)
            .map(|raw| {
                NewsCategory::parse(raw)
                    .map_err(|_| SessionError::InvalidResponse("news category entry"))
            })
            .collect()
    }

    /// List article headers within a category.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidResponse`] on a malformed listing.
    pub async fn get_news_articles(
        &self,
        path: &[String],
    ) -> Result<Vec<NewsArticle>, SessionError> {
        let payload = self.params()
            .bytes(FieldId::NewsPath, records::encode_path(path)?)
            .encode()?;
        let params = self
            .request(TransactionType::GetNewsArticleNameList, payload)
            .await?;
        let raw = params
            .first(FieldId::Data)
            .ok_or(SessionError::InvalidResponse("article list"))?;
        records::parse_article_list(raw)
            .map_err(|_| SessionError::InvalidResponse("article list"))
    }

    /// Fetch one article body in the given flavor.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the article does not exist.
    pub async fn get_news_article(
        &self,
        article_id: u32,
        path: &[String],
        flavor: &str,
    ) -> Result<ArticleData, SessionError> {
        let payload = self.params()
            .bytes(FieldId::NewsPath, records::encode_path(path)?)
            .u32(FieldId::NewsArticleId, article_id)
            .str(FieldId::NewsArticleFlavor, flavor)
            .encode()?;
        let params = self
            .request(TransactionType::GetNewsArticleData, payload)
            .await?;
        let text = params
            .first_str(FieldId::NewsArticleData)
            .ok_or(SessionError::InvalidResponse("article body"))?;
        Ok(ArticleData {
            title: params.first_str(FieldId::NewsArticleTitle),
            poster: params.first_str(FieldId::NewsArticlePoster),
            text: macroman::render_line_breaks(&text),
        })
    }

    /// Post an article, threaded under `parent_id` (0 posts a root article).
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when posting is refused.
    pub async fn post_news_article(
        &self,
        title: &str,
        text: &str,
        path: &[String],
        parent_id: u32,
    ) -> Result<(), SessionError> {
        let payload = self.params()
            .bytes(FieldId::NewsPath, records::encode_path(path)?)
            .u32(FieldId::NewsArticleId, parent_id)
            .str(FieldId::NewsArticleTitle, title)
            .str(FieldId::NewsArticleFlavor, "text/plain")
            .str(FieldId::NewsArticleData, text)
            .encode()?;
        self.request(TransactionType::PostNewsArticle, payload)
            .await
            .map(|_| ())
    }

    // --- message board --------------------------------------------------

    /// Fetch the message board text.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] outside the logged-in state.
    pub async fn get_message_board(&self) -> Result<String, SessionError> {
        let params = self
            .request(TransactionType::GetMessageBoard, Vec::new())
            .await?;
        Ok(params
            .first_str(FieldId::Data)
            .map(|t| macroman::render_line_breaks(&t))
            .unwrap_or_default())
    }

    /// Post to the message board.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when posting is refused.
    pub async fn post_message_board(&self, text: &str) -> Result<(), SessionError> {
        let payload = self.params().str(FieldId::Data, text).encode()?;
        self.request(TransactionType::PostMessageBoard, payload)
            .await
            .map(|_| ())
    }

    // --- administration -------------------------------------------------

    /// Fetch all accounts. Requires administrative access bits.
    ///
    /// # Errors
    /// Administrative denial surfaces as [`SessionError::Server`] with
    /// code 1.
    pub async fn get_accounts(&self) -> Result<Vec<Account>, SessionError> {
        let params = self.request(TransactionType::ListUsers, Vec::new()).await?;
        params
            .all(FieldId::Data)
            .map(parse_account_block)
            .collect()
    }

    /// Fetch one account by login name.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the account is unknown.
    pub async fn get_user(&self, login: &str) -> Result<Account, SessionError> {
        let payload = self.params()
            .negated_str(FieldId::Login, login)
            .encode()?;
        let params = self.request(TransactionType::GetUser, payload).await?;
        Ok(Account {
            login: params
                .first_negated_str(FieldId::Login)
                .unwrap_or_else(|| login.to_owned()),
            name: params.first_str(FieldId::UserName),
            access: params
                .first(FieldId::UserAccess)
                .map(Privileges::from_wire)
                .unwrap_or_default(),
        })
    }

    /// Create an account.
    ///
    /// # Errors
    /// Administrative denial surfaces as [`SessionError::Server`].
    pub async fn create_user(
        &self,
        login: &str,
        password: &str,
        name: &str,
        access: Privileges,
    ) -> Result<(), SessionError> {
        let payload = self.params()
            .negated_str(FieldId::Login, login)
            .negated_str(FieldId::Password, password)
            .str(FieldId::UserName, name)
            .bytes(FieldId::UserAccess, access.to_wire().to_vec())
            .encode()?;
        self.request(TransactionType::NewUser, payload)
            .await
            .map(|_| ())
    }

    /// Update an account. A `None` password leaves the stored one in place.
    ///
    /// # Errors
    /// Administrative denial surfaces as [`SessionError::Server`].
    pub async fn set_user(
        &self,
        login: &str,
        password: Option<&str>,
        name: &str,
        access: Privileges,
    ) -> Result<(), SessionError> {
        let payload = self.params()
            .negated_str(FieldId::Login, login)
            .maybe(FieldId::Password, password.map(macroman::encode_negated))
            .str(FieldId::UserName, name)
            .bytes(FieldId::UserAccess, access.to_wire().to_vec())
            .encode()?;
        self.request(TransactionType::SetUser, payload)
            .await
            .map(|_| ())
    }

    /// Delete an account by login name.
    ///
    /// # Errors
    /// Administrative denial surfaces as [`SessionError::Server`] with
    /// code 1; the session stays logged in.
    pub async fn delete_user(&self, login: &str) -> Result<(), SessionError> {
        let payload = self.params()
            .negated_str(FieldId::Login, login)
            .encode()?;
        self.request(TransactionType::DeleteUser, payload)
            .await
            .map(|_| ())
    }

    // --- transfers ------------------------------------------------------

    /// Request a file download slot; pass the result to a transfer engine.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn request_download_file(
        &self,
        name: &str,
        path: &[String],
        preview: bool,
    ) -> Result<TransferRef, SessionError> {
        let mut list = self.file_target(name, path)?;
        if preview {
            list = list.u16(FieldId::FileTransferOptions, 2);
        }
        let params = self
            .request(TransactionType::DownloadFile, list.encode()?)
            .await?;
        transfer_ref(&params, false)
    }

    /// Request a folder download slot.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server refuses.
    pub async fn request_download_folder(
        &self,
        name: &str,
        path: &[String],
    ) -> Result<TransferRef, SessionError> {
        let payload = self.file_target(name, path)?.encode()?;
        let params = self
            .request(TransactionType::DownloadFolder, payload)
            .await?;
        transfer_ref(&params, true)
    }

    /// Request a file upload slot.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when uploads are refused.
    pub async fn request_upload_file(
        &self,
        name: &str,
        path: &[String],
    ) -> Result<TransferRef, SessionError> {
        let payload = self.file_target(name, path)?.encode()?;
        let params = self.request(TransactionType::UploadFile, payload).await?;
        transfer_ref(&params, false)
    }

    /// Request a folder upload slot, declaring item count and total size.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when uploads are refused.
    pub async fn request_upload_folder(
        &self,
        name: &str,
        path: &[String],
        item_count: u16,
        total_size: u32,
    ) -> Result<TransferRef, SessionError> {
        let payload = self.file_target(name, path)?
            .u32(FieldId::TransferSize, total_size)
            .u16(FieldId::FolderItemCount, item_count)
            .encode()?;
        let params = self.request(TransactionType::UploadFolder, payload).await?;
        transfer_ref(&params, false)
    }

    /// Request the server banner as a raw transfer.
    ///
    /// # Errors
    /// Returns [`SessionError::Server`] when the server has no banner.
    pub async fn request_banner(&self) -> Result<TransferRef, SessionError> {
        let params = self
            .request(TransactionType::DownloadBanner, Vec::new())
            .await?;
        transfer_ref(&params, false)
    }

    // --- teardown -------------------------------------------------------

    /// Tear the session down.
    ///
    /// Pending requests fail with [`SessionError::NotConnected`], the event
    /// stream closes after a final [`ServerEvent::Disconnected`], and no
    /// further events are delivered. In-flight transfers run on their own
    /// channels and are not touched.
    pub async fn disconnect(&self) {
        if self.status() == SessionStatus::Disconnected {
            return;
        }
        self.shared.set_state_now(SessionStatus::Disconnecting);
        if let Some(handle) = self
            .keep_alive_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.receive_task.abort();
        self.shared.pending.drain();
        {
            let mut writer = self.shared.writer.lock().await;
            let _: Result<_, _> = writer.shutdown().await;
        }
        self.shared.set_state_now(SessionStatus::Disconnected);
        self.shared
            .send_event_now(ServerEvent::Disconnected(DisconnectReason::Local));
        self.shared.close_events();
        info!(host = %self.host, "disconnected");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.receive_task.abort();
        if let Some(handle) = self
            .keep_alive_task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.shared.pending.drain();
    }
}

fn transfer_ref(params: &Params, folder: bool) -> Result<TransferRef, SessionError> {
    let reference = params
        .first_u32(FieldId::ReferenceNumber)
        .ok_or(SessionError::InvalidResponse("transfer reference"))?;
    let size = params.first_u32(FieldId::TransferSize).unwrap_or(0);
    let item_count = if folder {
        Some(
            params
                .first_u16(FieldId::FolderItemCount)
                .ok_or(SessionError::InvalidResponse("folder item count"))?,
        )
    } else {
        None
    };
    Ok(TransferRef {
        reference,
        size,
        item_count,
    })
}

/// Accounts arrive as one nested parameter block per `Data` field.
fn parse_account_block(raw: &[u8]) -> Result<Account, SessionError> {
    let params =
        Params::decode(raw).map_err(|_| SessionError::InvalidResponse("account record"))?;
    Ok(Account {
        login: params
            .first_negated_str(FieldId::Login)
            .ok_or(SessionError::InvalidResponse("account login"))?,
        name: params.first_str(FieldId::UserName),
        access: params
            .first(FieldId::UserAccess)
            .map(Privileges::from_wire)
            .unwrap_or_default(),
    })
}

/// Translate one unsolicited frame into an event, if it maps to one.
fn classify_event(tx: &Transaction, known_users: &mut HashSet<u16>) -> Option<ServerEvent> {
    let params = match Params::decode(&tx.payload) {
        Ok(params) => params,
        Err(err) => {
            warn!(ty = tx.header.ty, %err, "undecodable event payload");
            return None;
        }
    };
    let text = |field: FieldId| {
        params
            .first_str(field)
            .map(|t| macroman::render_line_breaks(&t))
            .unwrap_or_default()
    };
    match TransactionType::from(tx.header.ty) {
        TransactionType::ChatMessage => Some(ServerEvent::ChatMessage(text(FieldId::Data))),
        TransactionType::ServerMessage => params.first_u16(FieldId::UserId).map_or_else(
            || Some(ServerEvent::ServerBroadcast(text(FieldId::Data))),
            |user_id| {
                Some(ServerEvent::PrivateMessage {
                    user_id,
                    text: text(FieldId::Data),
                })
            },
        ),
        TransactionType::NewMessage => Some(ServerEvent::NewsPosted(text(FieldId::Data))),
        TransactionType::ShowAgreement => {
            if params.contains(FieldId::NoServerAgreement) {
                None
            } else {
                Some(ServerEvent::AgreementRequired(text(FieldId::Data)))
            }
        }
        TransactionType::UserAccess => params
            .first(FieldId::UserAccess)
            .map(|raw| ServerEvent::UserAccess(Privileges::from_wire(raw))),
        TransactionType::NotifyChangeUser => {
            let user = UserInfo {
                id: params.first_u16(FieldId::UserId)?,
                icon: params.first_u16(FieldId::UserIconId).unwrap_or(0),
                flags: crate::user_flags::UserFlags::from_bits_truncate(
                    params.first_u16(FieldId::UserFlags).unwrap_or(0),
                ),
                name: params.first_str(FieldId::UserName).unwrap_or_default(),
            };
            if known_users.insert(user.id) {
                Some(ServerEvent::UserJoined(user))
            } else {
                Some(ServerEvent::UserChanged(user))
            }
        }
        TransactionType::NotifyDeleteUser => {
            let user_id = params.first_u16(FieldId::UserId)?;
            known_users.remove(&user_id);
            Some(ServerEvent::UserLeft(user_id))
        }
        other => {
            debug!(ty = %other, "ignoring unsolicited transaction");
            None
        }
    }
}

async fn receive_loop(read_half: OwnedReadHalf, shared: Arc<SessionShared>) {
    let mut framed = FramedRead::new(read_half, TransactionCodec::new());
    let mut known_users: HashSet<u16> = HashSet::new();
    let mut reason = DisconnectReason::ConnectionLost;
    loop {
        match framed.next().await {
            Some(Ok(tx)) => {
                shared.touch();
                if tx.header.is_reply() || tx.header.ty == TransactionType::Error.into() {
                    let id = tx.header.id;
                    if !shared.pending.complete(id, tx) {
                        debug!(id, "dropping reply with no waiting request");
                    }
                } else if tx.header.ty == TransactionType::DisconnectMessage.into() {
                    let message = Params::decode(&tx.payload)
                        .ok()
                        .and_then(|p| p.first_str(FieldId::Data))
                        .map(|t| macroman::render_line_breaks(&t));
                    reason = DisconnectReason::ServerShutdown(message);
                    break;
                } else if let Some(event) = classify_event(&tx, &mut known_users) {
                    shared.send_event(event).await;
                }
            }
            Some(Err(err)) => {
                warn!(%err, "receive loop terminated by decode failure");
                break;
            }
            None => break,
        }
    }
    shared.pending.drain();
    shared.set_state(SessionStatus::Disconnected).await;
    shared.send_event(ServerEvent::Disconnected(reason)).await;
    shared.close_events();
}

async fn keep_alive_loop(shared: Arc<SessionShared>) {
    let idle_threshold = KEEP_ALIVE_IDLE.min(shared.config.keep_alive_interval());
    loop {
        tokio::time::sleep(KEEP_ALIVE_TICK).await;
        if shared.lock_state() != SessionStatus::LoggedIn {
            continue;
        }
        if shared.idle_for() < idle_threshold {
            continue;
        }
        let version = shared.server_info().map_or(0, |s| s.version);
        let ty = if version >= KEEP_ALIVE_MIN_VERSION {
            TransactionType::KeepAlive
        } else {
            // Old servers lack transaction 500; an innocuous user-list
            // request keeps NATs open without visible side effects.
            TransactionType::GetUserNameList
        };
        if let Err(err) = send_request(&shared, ty, Vec::new()).await {
            warn!(%err, "keep-alive failed");
        }
    }
}
