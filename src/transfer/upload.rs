//! File upload engine.
//!
//! Uploads flatten a local file into the `FILP` envelope — an `INFO` fork
//! built from filesystem metadata, the data fork streamed in chunks, and an
//! optional `MACR` fork when a resource side-file exists — and stream it to
//! the server. The declared handshake size is the flattened length, which
//! callers can compute up front with [`FileUpload::flattened_len`] when the
//! upload request wants it.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::DateTime;
use tokio::{fs, io::AsyncReadExt, sync::watch};
use tracing::debug;

use super::{
    CancelFlag, TransferError, at_stage, download::resource_fork_path, filp, open_channel,
    progress::{ProgressSender, TransferProgress},
};
use crate::{
    config::ClientConfig, protocol::TransferKind, session::TransferRef, transport,
};

/// A single-file upload bound to a server-issued reference.
#[derive(Debug)]
pub struct FileUpload {
    host: String,
    port: u16,
    reference: TransferRef,
    source: Utf8PathBuf,
    config: ClientConfig,
    progress: ProgressSender,
    progress_rx: watch::Receiver<TransferProgress>,
    cancel: CancelFlag,
}

/// Flattened layout computed from the local file.
pub(crate) struct FlatPlan {
    pub(crate) info: Vec<u8>,
    pub(crate) data_len: u64,
    pub(crate) resource: Option<Vec<u8>>,
    pub(crate) total: u64,
}

impl FileUpload {
    /// Build an upload engine. `port` is the transfer port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        reference: TransferRef,
        source: Utf8PathBuf,
        config: ClientConfig,
    ) -> Self {
        let (progress, progress_rx) = ProgressSender::new(&config);
        Self {
            host: host.into(),
            port,
            reference,
            source,
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

    /// Length of the flattened representation of `source`.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the file cannot be inspected.
    pub async fn flattened_len(source: &Utf8Path) -> Result<u64, TransferError> {
        let plan = plan_flat(source).await?;
        Ok(plan.total)
    }

    /// Run the upload to completion.
    ///
    /// # Errors
    /// Returns [`TransferError::Cancelled`] on cancellation, or any channel
    /// or disk failure.
    pub async fn run(mut self) -> Result<(), TransferError> {
        let result = self.execute().await;
        match &result {
            Ok(()) => self.progress.state(TransferProgress::Completed { path: None }),
            Err(TransferError::Cancelled) => self.progress.state(TransferProgress::Cancelled),
            Err(err) => self.progress.state(TransferProgress::Failed {
                message: err.to_string(),
            }),
        }
        result
    }

    async fn execute(&mut self) -> Result<(), TransferError> {
        let plan = plan_flat(&self.source).await?;
        let total = u32::try_from(plan.total)
            .map_err(|_| TransferError::ProtocolViolation { stage: "flatten" })?;
        debug!(source = %self.source, total, "upload flattened");

        self.progress.state(TransferProgress::Connecting);
        let mut stream = open_channel(
            &self.host,
            self.port,
            &self.reference,
            total,
            TransferKind::File,
            &self.config,
        )
        .await?;
        self.progress.state(TransferProgress::Connected);

        let deadline = self.config.reply_timeout();
        let fork_count = if plan.resource.is_some() { 3 } else { 2 };
        let envelope = filp::Envelope {
            version: filp::FILP_VERSION,
            fork_count,
        };
        transport::write_all_timeout(&mut stream, &envelope.encode(), deadline)
            .await
            .map_err(at_stage("envelope"))?;

        let info_header = filp::ForkHeader {
            fork_type: filp::FORK_INFO,
            flags: 0,
            data_size: u32::try_from(plan.info.len())
                .map_err(|_| TransferError::ProtocolViolation { stage: "info fork" })?,
        };
        transport::write_all_timeout(&mut stream, &info_header.encode(), deadline)
            .await
            .map_err(at_stage("info fork"))?;
        transport::write_all_timeout(&mut stream, &plan.info, deadline)
            .await
            .map_err(at_stage("info fork"))?;

        let data_header = filp::ForkHeader {
            fork_type: filp::FORK_DATA,
            flags: 0,
            data_size: u32::try_from(plan.data_len)
                .map_err(|_| TransferError::ProtocolViolation { stage: "data fork" })?,
        };
        transport::write_all_timeout(&mut stream, &data_header.encode(), deadline)
            .await
            .map_err(at_stage("data fork"))?;

        let name = self.source.file_name().unwrap_or("upload").to_owned();
        let mut file = fs::File::open(&self.source).await?;
        let mut chunk = vec![0u8; self.config.download_chunk_bytes.max(1)];
        let mut sent: u64 = 0;
        while sent < plan.data_len {
            self.cancel.check()?;
            let take = usize::try_from((plan.data_len - sent).min(chunk.len() as u64))
                .unwrap_or(chunk.len());
            let slice = chunk
                .get_mut(..take)
                .ok_or(TransferError::ProtocolViolation { stage: "data fork" })?;
            file.read_exact(slice).await?;
            transport::write_all_timeout(&mut stream, slice, deadline)
                .await
                .map_err(at_stage("data fork"))?;
            sent += take as u64;
            self.progress.transferred(&name, sent, plan.data_len);
        }
        if plan.data_len == 0 {
            self.progress.transferred(&name, 0, 0);
        }

        if let Some(resource) = &plan.resource {
            let macr_header = filp::ForkHeader {
                fork_type: filp::FORK_MACR,
                flags: 0,
                data_size: u32::try_from(resource.len())
                    .map_err(|_| TransferError::ProtocolViolation { stage: "resource fork" })?,
            };
            transport::write_all_timeout(&mut stream, &macr_header.encode(), deadline)
                .await
                .map_err(at_stage("resource fork"))?;
            transport::write_all_timeout(&mut stream, resource, deadline)
                .await
                .map_err(at_stage("resource fork"))?;
        }
        Ok(())
    }
}

pub(crate) async fn plan_flat(source: &Utf8Path) -> Result<FlatPlan, TransferError> {
    let meta = fs::metadata(source).await?;
    if !meta.is_file() {
        return Err(TransferError::DestinationUnwritable(source.to_owned()));
    }
    let modified = meta
        .modified()
        .ok()
        .map(DateTime::<chrono::Utc>::from)
        .map(|dt| dt.naive_utc());
    let name = source.file_name().unwrap_or("upload");
    let info = filp::InfoFork::plain(name, modified).encode();
    let resource = match fs::read(resource_fork_path(source)).await {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        _ => None,
    };
    let total = filp::flattened_size(
        info.len() as u64,
        meta.len(),
        resource.as_ref().map(|r| r.len() as u64),
    );
    Ok(FlatPlan {
        info,
        data_len: meta.len(),
        resource,
        total,
    })
}
