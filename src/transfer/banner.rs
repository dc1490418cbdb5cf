//! Banner and preview transfers.
//!
//! Both reuse the `HTXF` handshake but the payload is raw bytes of the
//! declared length, never a flattened file object. Keeping this a distinct
//! engine (rather than a mode of the file download) avoids the classic
//! pitfall of feeding raw banner bytes into the envelope parser.

use tokio::sync::watch;

use super::{
    CancelFlag, TransferError, at_stage, open_channel,
    progress::{ProgressSender, TransferProgress},
};
use crate::{
    config::ClientConfig, protocol::TransferKind, session::TransferRef, transport,
};

/// Image container sniffed from the leading banner bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG/JFIF.
    Jpeg,
    /// PNG.
    Png,
    /// GIF87a/GIF89a.
    Gif,
}

/// A downloaded banner or preview payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Raw payload bytes.
    pub bytes: Vec<u8>,
    /// Sniffed image container, when recognised.
    pub format: Option<ImageFormat>,
}

/// Sniff the image container from the first bytes of a payload.
#[must_use]
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0xFF, 0xD8]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(b"GIF8") {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}

/// Raw-stream download of a banner or file preview.
#[derive(Debug)]
pub struct BannerDownload {
    host: String,
    port: u16,
    reference: TransferRef,
    config: ClientConfig,
    progress: ProgressSender,
    progress_rx: watch::Receiver<TransferProgress>,
    cancel: CancelFlag,
}

impl BannerDownload {
    /// Build a raw-stream download. `port` is the transfer port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        reference: TransferRef,
        config: ClientConfig,
    ) -> Self {
        let (progress, progress_rx) = ProgressSender::new(&config);
        Self {
            host: host.into(),
            port,
            reference,
            config,
            progress,
            progress_rx,
            cancel: CancelFlag::new(),
        }
    }

    /// Subscribe to progress; slow subscribers observe the latest value.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> { self.progress_rx.clone() }

    /// Handle for cancelling the transfer from another task.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }

    /// Run the download, returning the payload in memory.
    ///
    /// # Errors
    /// Returns [`TransferError::Cancelled`] on cancellation, or any channel
    /// failure.
    pub async fn run(mut self) -> Result<Banner, TransferError> {
        let result = self.execute().await;
        match &result {
            Ok(_) => self.progress.state(TransferProgress::Completed { path: None }),
            Err(TransferError::Cancelled) => self.progress.state(TransferProgress::Cancelled),
            Err(err) => self.progress.state(TransferProgress::Failed {
                message: err.to_string(),
            }),
        }
        result
    }

    async fn execute(&mut self) -> Result<Banner, TransferError> {
        self.progress.state(TransferProgress::Connecting);
        let mut stream = open_channel(
            &self.host,
            self.port,
            &self.reference,
            0,
            TransferKind::File,
            &self.config,
        )
        .await?;
        self.progress.state(TransferProgress::Connected);

        let deadline = self.config.reply_timeout();
        let total = u64::from(self.reference.size);
        let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));
        let mut chunk = vec![0u8; self.config.download_chunk_bytes.max(1)];
        let mut received: u64 = 0;
        while received < total {
            self.cancel.check()?;
            let take =
                usize::try_from((total - received).min(chunk.len() as u64)).unwrap_or(chunk.len());
            let slice = chunk
                .get_mut(..take)
                .ok_or(TransferError::ProtocolViolation { stage: "banner" })?;
            transport::read_exact_timeout(&mut stream, slice, deadline)
                .await
                .map_err(at_stage("banner"))?;
            bytes.extend_from_slice(slice);
            received += take as u64;
            self.progress.transferred("banner", received, total);
        }
        if total == 0 {
            self.progress.transferred("banner", 0, 0);
        }
        let format = sniff_format(&bytes);
        Ok(Banner { bytes, format })
    }
}
