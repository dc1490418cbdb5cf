//! File transfer engines.
//!
//! Every transfer opens its own one-shot TCP channel to the server's
//! transfer port, writes the `HTXF` handshake, then streams a payload whose
//! shape depends on the transfer kind: a flattened file object for file
//! transfers, an item sequence for folders, raw bytes for banners and
//! previews. The server never replies on this channel.
//!
//! Engines are owned by the caller and independent of the session that
//! produced their reference numbers; disconnecting a session leaves running
//! transfers untouched.

pub mod banner;
pub mod download;
pub mod filp;
pub mod folder;
pub mod progress;
pub mod upload;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::net::TcpStream;

pub use self::{
    banner::{Banner, BannerDownload, ImageFormat},
    download::{DownloadDestination, FileDownload},
    folder::{FolderDownload, FolderUpload, ItemProgress},
    progress::TransferProgress,
    upload::FileUpload,
};
use crate::{
    config::ClientConfig,
    protocol::{self, TransferKind},
    session::TransferRef,
    transaction::TransactionError,
    transport,
};

/// Folder-transfer action: the receiver wants the announced file.
pub(crate) const ACTION_SEND_FILE: u16 = 1;
/// Folder-transfer action: the receiver wants the file resumed.
pub(crate) const ACTION_RESUME_FILE: u16 = 2;
/// Folder-transfer action: advance to the next item.
pub(crate) const ACTION_NEXT_FILE: u16 = 3;

/// Errors surfaced by transfer engines.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The transfer channel could not be opened.
    #[error("transfer connect failed: {0}")]
    Connect(#[source] std::io::Error),
    /// The handshake could not be written.
    #[error("transfer handshake failed")]
    Handshake(#[source] std::io::Error),
    /// The peer violated the transfer protocol at the named stage.
    #[error("protocol violation during {stage}")]
    ProtocolViolation {
        /// Parsing stage that observed the violation.
        stage: &'static str,
    },
    /// Socket or disk failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The channel stalled past its deadline.
    #[error("transfer timed out")]
    Timeout,
    /// The caller cancelled the transfer.
    #[error("transfer cancelled")]
    Cancelled,
    /// The destination could not be created or written.
    #[error("destination is not writable: {0}")]
    DestinationUnwritable(Utf8PathBuf),
}

/// Map a transport-layer error into a transfer error at the given stage.
pub(crate) fn at_stage(stage: &'static str) -> impl Fn(TransactionError) -> TransferError {
    move |err| match err {
        TransactionError::Timeout => TransferError::Timeout,
        TransactionError::Io(io) => TransferError::Io(io),
        _ => TransferError::ProtocolViolation { stage },
    }
}

/// Shared cancellation flag checked between transfer chunks.
///
/// Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, uncancelled flag.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Request cancellation.
    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::Relaxed) }

    pub(crate) fn check(&self) -> Result<(), TransferError> {
        if self.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Open the transfer channel and write the 16-byte handshake.
pub(crate) async fn open_channel(
    host: &str,
    port: u16,
    reference: &TransferRef,
    data_size: u32,
    kind: TransferKind,
    config: &ClientConfig,
) -> Result<TcpStream, TransferError> {
    let mut stream = transport::connect(host, port, config.handshake_timeout())
        .await
        .map_err(|err| match err {
            TransactionError::Io(io) => TransferError::Connect(io),
            TransactionError::Timeout => TransferError::Timeout,
            _ => TransferError::ProtocolViolation { stage: "connect" },
        })?;
    let handshake = protocol::transfer_handshake(reference.reference, data_size, kind);
    transport::write_all_timeout(&mut stream, &handshake, config.handshake_timeout())
        .await
        .map_err(|err| match err {
            TransactionError::Io(io) => TransferError::Handshake(io),
            TransactionError::Timeout => TransferError::Timeout,
            _ => TransferError::ProtocolViolation { stage: "handshake" },
        })?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(flag.check().is_ok());
        other.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(TransferError::Cancelled)));
    }

    #[test]
    fn stage_mapping_preserves_io_and_timeout() {
        let map = at_stage("fork header");
        assert!(matches!(
            map(TransactionError::Timeout),
            TransferError::Timeout
        ));
        assert!(matches!(
            map(TransactionError::ShortBuffer),
            TransferError::ProtocolViolation {
                stage: "fork header"
            }
        ));
    }
}
