//! Unsolicited server events and the session event stream.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::{privileges::Privileges, records::UserInfo};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No connection.
    Disconnected,
    /// TCP connect in progress.
    Connecting,
    /// Magic exchange in progress.
    Handshaking,
    /// Login request in flight.
    LoggingIn,
    /// Handshake accepted, not yet authenticated.
    Connected,
    /// Authenticated; all operations permitted.
    LoggedIn,
    /// Teardown in progress.
    Disconnecting,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The caller asked for the disconnect.
    Local,
    /// The server sent a disconnect message, possibly with an explanation.
    ServerShutdown(Option<String>),
    /// The connection failed or reached EOF.
    ConnectionLost,
}

/// Unsolicited traffic and lifecycle notifications from a session.
///
/// Events are delivered in arrival order on a single-consumer stream bound
/// to the session's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The session state machine moved.
    StatusChanged(SessionStatus),
    /// A public chat line.
    ChatMessage(String),
    /// A broadcast from the server or an administrator.
    ServerBroadcast(String),
    /// A private message from another user.
    PrivateMessage {
        /// Sender's user id.
        user_id: u16,
        /// Message body.
        text: String,
    },
    /// A user appeared in the user list.
    UserJoined(UserInfo),
    /// A listed user changed name, icon, or flags.
    UserChanged(UserInfo),
    /// A user left.
    UserLeft(u16),
    /// A message-board or news post notification.
    NewsPosted(String),
    /// The server requires the agreement text to be accepted.
    AgreementRequired(String),
    /// The server granted or revised this session's privileges.
    UserAccess(Privileges),
    /// The session ended.
    Disconnected(DisconnectReason),
}

/// Single-consumer stream of [`ServerEvent`]s.
///
/// The stream closes after a [`ServerEvent::Disconnected`] has been
/// delivered and the session has shut down.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<ServerEvent>,
}

impl EventStream {
    pub(crate) const fn new(rx: mpsc::Receiver<ServerEvent>) -> Self { Self { rx } }

    /// Receive the next event, or `None` once the stream has closed.
    pub async fn recv(&mut self) -> Option<ServerEvent> { self.rx.recv().await }
}

impl Stream for EventStream {
    type Item = ServerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<ServerEvent>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn delivers_events_in_order_and_closes() {
        let (tx, rx) = mpsc::channel(4);
        let mut stream = EventStream::new(rx);
        tx.send(ServerEvent::ChatMessage("one".to_owned()))
            .await
            .unwrap();
        tx.send(ServerEvent::Disconnected(DisconnectReason::Local))
            .await
            .unwrap();
        drop(tx);
        assert_eq!(
            stream.next().await,
            Some(ServerEvent::ChatMessage("one".to_owned()))
        );
        assert_eq!(
            stream.recv().await,
            Some(ServerEvent::Disconnected(DisconnectReason::Local))
        );
        assert_eq!(stream.recv().await, None);
    }
}
