//! File download engine.
//!
//! Downloads open a transfer channel, parse the flattened file object, and
//! stream the data fork to disk in chunks. The destination is written as a
//! temporary sibling and renamed into place on completion; failures and
//! cancellation remove the partial file. `MACR` fork bytes are retained in
//! memory and written to the platform resource side-file at the end.

use camino::{Utf8Path, Utf8PathBuf};
use tokio::{
    fs,
    io::AsyncWriteExt,
    net::TcpStream,
    sync::watch,
};
use tracing::{debug, warn};

use super::{
    CancelFlag, TransferError, at_stage, filp, open_channel,
    progress::{ProgressSender, TransferProgress},
};
use crate::{
    config::ClientConfig, protocol::TransferKind, session::TransferRef, transport,
};

/// Where a download lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadDestination {
    /// Write to exactly this file, replacing it atomically if present.
    File(Utf8PathBuf),
    /// Create a file in this directory, named by the server's `INFO` fork
    /// and uniquified against existing entries.
    Directory(Utf8PathBuf),
}

/// A single-file download bound to a server-issued reference.
#[derive(Debug)]
pub struct FileDownload {
    host: String,
    port: u16,
    reference: TransferRef,
    destination: DownloadDestination,
    config: ClientConfig,
    progress: ProgressSender,
    progress_rx: watch::Receiver<TransferProgress>,
    cancel: CancelFlag,
}

/// Open destination file state during a transfer.
struct OpenDestination {
    file: fs::File,
    temp: Utf8PathBuf,
    target: Utf8PathBuf,
}

impl FileDownload {
    /// Build a download engine. `port` is the transfer port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        reference: TransferRef,
        destination: DownloadDestination,
        config: ClientConfig,
    ) -> Self {
        let (progress, progress_rx) = ProgressSender::new(&config);
        Self {
            host: host.into(),
            port,
            reference,
            destination,
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

    /// Run the download to completion, returning the final path.
    ///
    /// # Errors
    /// Returns [`TransferError::Cancelled`] on cancellation; partial output
    /// is removed in every failure mode.
    pub async fn run(mut self) -> Result<Utf8PathBuf, TransferError> {
        let mut open: Option<OpenDestination> = None;
        let result = self.execute(&mut open).await;
        match result {
            Ok(path) => {
                self.progress.state(TransferProgress::Completed {
                    path: Some(path.clone()),
                });
                Ok(path)
            }
            Err(err) => {
                if let Some(dest) = open {
                    remove_partial(&dest.temp).await;
                }
                if matches!(err, TransferError::Cancelled) {
                    self.progress.state(TransferProgress::Cancelled);
                } else {
                    self.progress.state(TransferProgress::Failed {
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        open: &mut Option<OpenDestination>,
    ) -> Result<Utf8PathBuf, TransferError> {
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
        let mut envelope_buf = [0u8; filp::ENVELOPE_LEN];
        transport::read_exact_timeout(&mut stream, &mut envelope_buf, deadline)
            .await
            .map_err(at_stage("envelope"))?;
        let envelope = filp::Envelope::parse(&envelope_buf)
            .map_err(|_| TransferError::ProtocolViolation { stage: "envelope" })?;

        let mut info: Option<filp::InfoFork> = None;
        let mut info_len: u64 = 0;
        let mut resource: Option<Vec<u8>> = None;
        for _ in 0..envelope.fork_count {
            self.cancel.check()?;
            let mut fork_buf = [0u8; filp::FORK_HEADER_LEN];
            transport::read_exact_timeout(&mut stream, &mut fork_buf, deadline)
                .await
                .map_err(at_stage("fork header"))?;
            let fork = filp::ForkHeader::parse(&fork_buf);
            match fork.fork_type {
                filp::FORK_INFO => {
                    let size = usize::try_from(fork.data_size)
                        .ok()
                        .filter(|s| (1..=64 * 1024).contains(s))
                        .ok_or(TransferError::ProtocolViolation { stage: "info fork" })?;
                    let mut body = vec![0u8; size];
                    transport::read_exact_timeout(&mut stream, &mut body, deadline)
                        .await
                        .map_err(at_stage("info fork"))?;
                    info_len = body.len() as u64;
                    let parsed = filp::InfoFork::parse(&body)
                        .map_err(|_| TransferError::ProtocolViolation { stage: "info fork" })?;
                    debug!(name = %parsed.name, "download metadata received");
                    info = Some(parsed);
                }
                filp::FORK_DATA => {
                    let size = if fork.data_size > 0 {
                        u64::from(fork.data_size)
                    } else {
                        // Some servers leave the fork size zero; the slot
                        // size from the download request minus the INFO fork
                        // is the remaining data fork length.
                        u64::from(self.reference.size).saturating_sub(info_len)
                    };
                    ensure_open(&self.destination, open, info.as_ref()).await?;
                    let dest = open
                        .as_mut()
                        .ok_or(TransferError::ProtocolViolation { stage: "data fork" })?;
                    let name = dest
                        .target
                        .file_name()
                        .unwrap_or("download")
                        .to_owned();
                    self.stream_fork(&mut stream, dest, size, &name).await?;
                }
                filp::FORK_MACR => {
                    let size = usize::try_from(fork.data_size).unwrap_or(0);
                    let mut body = vec![0u8; size];
                    transport::read_exact_timeout(&mut stream, &mut body, deadline)
                        .await
                        .map_err(at_stage("resource fork"))?;
                    resource = Some(body);
                }
                other => {
                    debug!(fork = ?other, size = fork.data_size, "skipping unknown fork");
                    self.skip_fork(&mut stream, u64::from(fork.data_size)).await?;
                }
            }
        }

        let dest = open
            .take()
            .ok_or(TransferError::ProtocolViolation { stage: "data fork" })?;
        finalize(dest, resource.as_deref()).await
    }

    async fn stream_fork(
        &mut self,
        stream: &mut TcpStream,
        dest: &mut OpenDestination,
        size: u64,
        name: &str,
    ) -> Result<(), TransferError> {
        let deadline = self.config.reply_timeout();
        let mut chunk = vec![0u8; self.config.download_chunk_bytes.max(1)];
        let mut received: u64 = 0;
        while received < size {
            self.cancel.check()?;
            let take = usize::try_from((size - received).min(chunk.len() as u64))
                .unwrap_or(chunk.len());
            let slice = chunk
                .get_mut(..take)
                .ok_or(TransferError::ProtocolViolation { stage: "data fork" })?;
            transport::read_exact_timeout(stream, slice, deadline)
                .await
                .map_err(at_stage("data fork"))?;
            dest.file.write_all(slice).await?;
            received += take as u64;
            self.progress.transferred(name, received, size);
        }
        if size == 0 {
            self.progress.transferred(name, 0, 0);
        }
        Ok(())
    }

    async fn skip_fork(
        &mut self,
        stream: &mut TcpStream,
        size: u64,
    ) -> Result<(), TransferError> {
        let deadline = self.config.reply_timeout();
        let mut chunk = vec![0u8; self.config.download_chunk_bytes.max(1)];
        let mut remaining = size;
        while remaining > 0 {
            self.cancel.check()?;
            let take =
                usize::try_from(remaining.min(chunk.len() as u64)).unwrap_or(chunk.len());
            let slice = chunk
                .get_mut(..take)
                .ok_or(TransferError::ProtocolViolation { stage: "fork skip" })?;
            transport::read_exact_timeout(stream, slice, deadline)
                .await
                .map_err(at_stage("fork skip"))?;
            remaining -= take as u64;
        }
        Ok(())
    }
}

/// Resolve the destination and open its temporary file, once.
async fn ensure_open(
    destination: &DownloadDestination,
    open: &mut Option<OpenDestination>,
    info: Option<&filp::InfoFork>,
) -> Result<(), TransferError> {
    if open.is_some() {
        return Ok(());
    }
    let target = match destination {
        DownloadDestination::File(path) => path.clone(),
        DownloadDestination::Directory(dir) => {
            let name = info.map_or("download", |i| i.name.as_str());
            unique_destination(dir, name).await
        }
    };
    let temp = temp_path(&target);
    let file = fs::File::create(&temp)
        .await
        .map_err(|_| TransferError::DestinationUnwritable(target.clone()))?;
    *open = Some(OpenDestination { file, temp, target });
    Ok(())
}

async fn finalize(
    mut dest: OpenDestination,
    resource: Option<&[u8]>,
) -> Result<Utf8PathBuf, TransferError> {
    dest.file.flush().await?;
    drop(dest.file);
    fs::rename(&dest.temp, &dest.target).await?;
    if let Some(bytes) = resource {
        if !bytes.is_empty() {
            let side = resource_fork_path(&dest.target);
            if let Err(err) = fs::write(&side, bytes).await {
                warn!(%side, %err, "could not write resource fork side-file");
            }
        }
    }
    Ok(dest.target)
}

async fn remove_partial(temp: &Utf8Path) {
    if let Err(err) = fs::remove_file(temp).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(%temp, %err, "could not remove partial download");
        }
    }
}

/// Temporary sibling used for atomic replacement.
fn temp_path(target: &Utf8Path) -> Utf8PathBuf {
    let name = target.file_name().unwrap_or("download");
    target.with_file_name(format!(".{name}.part"))
}

/// Platform location for resource fork bytes next to `data_path`.
#[must_use]
pub fn resource_fork_path(data_path: &Utf8Path) -> Utf8PathBuf {
    #[cfg(target_os = "macos")]
    {
        data_path.join("..namedfork/rsrc")
    }
    #[cfg(not(target_os = "macos"))]
    {
        let name = data_path.file_name().unwrap_or("download");
        data_path.with_file_name(format!("._{name}"))
    }
}

/// First non-colliding destination for `name` in `dir`.
async fn unique_destination(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let candidate = dir.join(sanitize_name(name));
    if fs::try_exists(&candidate).await.ok() != Some(true) {
        return candidate;
    }
    let (stem, ext) = split_name(name);
    for n in 1u32.. {
        let next = if ext.is_empty() {
            dir.join(format!("{stem} {n}"))
        } else {
            dir.join(format!("{stem} {n}.{ext}"))
        };
        if fs::try_exists(&next).await.ok() != Some(true) {
            return next;
        }
    }
    candidate
}

/// Keep server-supplied names from escaping the destination directory.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "download".to_owned()
    } else {
        cleaned
    }
}

fn split_name(name: &str) -> (String, String) {
    let sanitized = sanitize_name(name);
    match sanitized.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_owned(), ext.to_owned()),
        _ => (sanitized, String::new()),
    }
}
