//! Error type surfaced by session operations.

use thiserror::Error;

use crate::transaction::TransactionError;

/// Errors that can occur while driving a control-channel session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not permitted in the session's current state, or the
    /// connection is gone.
    #[error("not connected")]
    NotConnected,
    /// The control handshake was refused with the given code.
    #[error("handshake failed with code {0}")]
    Handshake(u32),
    /// The login reply carried a nonzero error code.
    #[error("login failed")]
    LoginFailed(Option<String>),
    /// A request reply carried a nonzero error code after login.
    #[error("server error {code}")]
    Server {
        /// Error code from the reply header.
        code: u32,
        /// Error text supplied by the server, when present.
        text: Option<String>,
    },
    /// No reply arrived within the request deadline.
    #[error("request timed out")]
    Timeout,
    /// A reply was missing a required field or failed to decode.
    #[error("invalid response: {0}")]
    InvalidResponse(&'static str),
    /// The awaiting caller was cancelled before a reply arrived.
    #[error("request cancelled")]
    Cancelled,
    /// Frame-level encoding or decoding failed.
    #[error(transparent)]
    Transaction(TransactionError),
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransactionError> for SessionError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Timeout => Self::Timeout,
            TransactionError::Io(e) => Self::Io(e),
            other => Self::Transaction(other),
        }
    }
}

impl SessionError {
    /// The server-supplied error text, when the error carries one.
    #[must_use]
    pub fn server_text(&self) -> Option<&str> {
        match self {
            Self::LoginFailed(text) | Self::Server { text, .. } => text.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_timeouts_surface_as_timeout() {
        let err = SessionError::from(TransactionError::Timeout);
        assert!(matches!(err, SessionError::Timeout));
    }

    #[test]
    fn io_errors_keep_their_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = SessionError::from(TransactionError::Io(io));
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[test]
    fn server_text_is_exposed() {
        let err = SessionError::Server {
            code: 1,
            text: Some("Permission denied".to_owned()),
        };
        assert_eq!(err.server_text(), Some("Permission denied"));
        assert_eq!(SessionError::Timeout.server_text(), None);
    }
}
