//! Folder transfer engines.
//!
//! Folder transfers move an item sequence over one channel. Each item is
//! announced with a length-prefixed header naming its kind and relative
//! path; files are then exchanged as flattened file objects gated by `u16`
//! actions. Downloads drive the server with actions; uploads obey the
//! actions the server sends back.
//!
//! Byte-level progress is coalesced through the watch channel like every
//! transfer; item boundaries additionally flow through an unbounded item
//! channel so no milestone is lost to coalescing.

#![expect(clippy::big_endian_bytes, reason = "network protocol uses big-endian")]

use camino::{Utf8Path, Utf8PathBuf};
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, watch},
};
use tracing::{debug, warn};

use super::{
    ACTION_NEXT_FILE, ACTION_RESUME_FILE, ACTION_SEND_FILE, CancelFlag, TransferError, at_stage,
    filp, open_channel,
    progress::{ProgressSender, TransferProgress},
    upload::plan_flat,
};
use crate::{
    config::{ClientConfig, ResumePolicy},
    protocol::TransferKind,
    records::{FolderItem, FolderItemKind},
    session::TransferRef,
    transport,
};

/// A completed item within a folder transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProgress {
    /// Item name (final path component).
    pub name: String,
    /// 1-based index of the item in the sequence.
    pub index: u16,
    /// Total number of items.
    pub total: u16,
}

/// Recursive folder download bound to a server-issued reference.
#[derive(Debug)]
pub struct FolderDownload {
    host: String,
    port: u16,
    reference: TransferRef,
    destination: Utf8PathBuf,
    config: ClientConfig,
    progress: ProgressSender,
    progress_rx: watch::Receiver<TransferProgress>,
    items_tx: mpsc::UnboundedSender<ItemProgress>,
    items_rx: Option<mpsc::UnboundedReceiver<ItemProgress>>,
    cancel: CancelFlag,
}

impl FolderDownload {
    /// Build a folder download. `port` is the transfer port; `destination`
    /// is the directory the folder contents land in.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        reference: TransferRef,
        destination: Utf8PathBuf,
        config: ClientConfig,
    ) -> Self {
        let (progress, progress_rx) = ProgressSender::new(&config);
        let (items_tx, items_rx) = mpsc::unbounded_channel();
        Self {
            host: host.into(),
            port,
            reference,
            destination,
            config,
            progress,
            progress_rx,
            items_tx,
            items_rx: Some(items_rx),
            cancel: CancelFlag::new(),
        }
    }

    /// Subscribe to byte-level progress.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> { self.progress_rx.clone() }

    /// Take the per-item milestone stream. Yields once per completed item.
    #[must_use]
    pub fn item_events(&mut self) -> Option<mpsc::UnboundedReceiver<ItemProgress>> {
        self.items_rx.take()
    }

    /// Handle for cancelling the transfer from another task.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }

    /// Run the download to completion.
    ///
    /// # Errors
    /// Returns [`TransferError::Cancelled`] on cancellation; a partial file
    /// in flight is removed, already-completed items are kept.
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
        self.progress.state(TransferProgress::Connecting);
        let mut stream = open_channel(
            &self.host,
            self.port,
            &self.reference,
            0,
            TransferKind::Folder,
            &self.config,
        )
        .await?;
        self.progress.state(TransferProgress::Connected);

        let deadline = self.config.reply_timeout();
        write_action(&mut stream, ACTION_NEXT_FILE, deadline).await?;

        let item_total = self.reference.item_count.unwrap_or(0);
        let byte_total = u64::from(self.reference.size);
        let mut bytes_done: u64 = 0;
        for index in 1..=item_total {
            self.cancel.check()?;
            let mut len_buf = [0u8; 2];
            transport::read_exact_timeout(&mut stream, &mut len_buf, deadline)
                .await
                .map_err(at_stage("item header"))?;
            let header_len = usize::from(u16::from_be_bytes(len_buf));
            let mut header = vec![0u8; header_len];
            transport::read_exact_timeout(&mut stream, &mut header, deadline)
                .await
                .map_err(at_stage("item header"))?;
            let item = FolderItem::parse(&header)
                .map_err(|_| TransferError::ProtocolViolation { stage: "item header" })?;
            let rel = relative_item_path(&item.path)
                .ok_or(TransferError::ProtocolViolation { stage: "item path" })?;
            let target = self.destination.join(&rel);
            let name = item.path.last().cloned().unwrap_or_default();
            match item.kind {
                FolderItemKind::Folder => {
                    fs::create_dir_all(&target)
                        .await
                        .map_err(|_| TransferError::DestinationUnwritable(target.clone()))?;
                    debug!(%target, "created folder");
                    write_action(&mut stream, ACTION_NEXT_FILE, deadline).await?;
                }
                FolderItemKind::File => {
                    write_action(&mut stream, ACTION_SEND_FILE, deadline).await?;
                    let mut size_buf = [0u8; 4];
                    transport::read_exact_timeout(&mut stream, &mut size_buf, deadline)
                        .await
                        .map_err(at_stage("file size"))?;
                    bytes_done = self
                        .receive_flat_file(&mut stream, &target, bytes_done, byte_total, &name)
                        .await?;
                    let _: Result<_, _> = self.items_tx.send(ItemProgress {
                        name,
                        index,
                        total: item_total,
                    });
                }
            }
        }
        Ok(())
    }

    /// Read one flattened file into `target`, returning the updated global
    /// byte counter.
    async fn receive_flat_file(
        &mut self,
        stream: &mut TcpStream,
        target: &Utf8Path,
        mut bytes_done: u64,
        byte_total: u64,
        name: &str,
    ) -> Result<u64, TransferError> {
        let deadline = self.config.reply_timeout();
        let mut envelope_buf = [0u8; filp::ENVELOPE_LEN];
        transport::read_exact_timeout(stream, &mut envelope_buf, deadline)
            .await
            .map_err(at_stage("envelope"))?;
        let envelope = filp::Envelope::parse(&envelope_buf)
            .map_err(|_| TransferError::ProtocolViolation { stage: "envelope" })?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|_| TransferError::DestinationUnwritable(parent.to_owned()))?;
        }
        let temp = target.with_file_name(format!(
            ".{}.part",
            target.file_name().unwrap_or("download")
        ));
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|_| TransferError::DestinationUnwritable(target.to_owned()))?;

        let mut chunk = vec![0u8; self.config.download_chunk_bytes.max(1)];
        let outcome: Result<(), TransferError> = async {
            for _ in 0..envelope.fork_count {
                let mut fork_buf = [0u8; filp::FORK_HEADER_LEN];
                transport::read_exact_timeout(stream, &mut fork_buf, deadline)
                    .await
                    .map_err(at_stage("fork header"))?;
                let fork = filp::ForkHeader::parse(&fork_buf);
                let mut remaining = u64::from(fork.data_size);
                let is_data = fork.fork_type == filp::FORK_DATA;
                while remaining > 0 {
                    self.cancel.check()?;
                    let take = usize::try_from(remaining.min(chunk.len() as u64))
                        .unwrap_or(chunk.len());
                    let slice = chunk
                        .get_mut(..take)
                        .ok_or(TransferError::ProtocolViolation { stage: "data fork" })?;
                    transport::read_exact_timeout(stream, slice, deadline)
                        .await
                        .map_err(at_stage("data fork"))?;
                    if is_data {
                        file.write_all(slice).await?;
                        bytes_done += take as u64;
                        self.progress.transferred(name, bytes_done, byte_total);
                    }
                    remaining -= take as u64;
                }
            }
            file.flush().await?;
            Ok(())
        }
        .await;
        drop(file);
        if let Err(err) = outcome {
            if let Err(remove_err) = fs::remove_file(&temp).await {
                warn!(%temp, %remove_err, "could not remove partial file");
            }
            return Err(err);
        }
        fs::rename(&temp, target).await?;
        Ok(bytes_done)
    }
}

/// Recursive folder upload bound to a server-issued reference.
#[derive(Debug)]
pub struct FolderUpload {
    host: String,
    port: u16,
    reference: TransferRef,
    source: Utf8PathBuf,
    config: ClientConfig,
    progress: ProgressSender,
    progress_rx: watch::Receiver<TransferProgress>,
    cancel: CancelFlag,
}

impl FolderUpload {
    /// Build a folder upload. `port` is the transfer port; `source` is the
    /// local directory whose contents are sent (the root itself is not).
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

    /// Subscribe to byte-level progress.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<TransferProgress> { self.progress_rx.clone() }

    /// Handle for cancelling the transfer from another task.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag { self.cancel.clone() }

    /// Count items and total data bytes under `source`, as the upload
    /// request wants them declared.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the directory cannot be walked.
    pub fn measure(source: &Utf8Path) -> Result<(u16, u64), TransferError> {
        let items = walk_folder(source)?;
        let count = u16::try_from(items.len())
            .map_err(|_| TransferError::ProtocolViolation { stage: "folder walk" })?;
        let mut total: u64 = 0;
        for entry in &items {
            if let Some(path) = &entry.1 {
                total += std::fs::metadata(path.as_std_path())?.len();
            }
        }
        Ok((count, total))
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
        let items = walk_folder(&self.source)?;
        self.progress.state(TransferProgress::Connecting);
        let mut stream = open_channel(
            &self.host,
            self.port,
            &self.reference,
            self.reference.size,
            TransferKind::Folder,
            &self.config,
        )
        .await?;
        self.progress.state(TransferProgress::Connected);

        let deadline = self.config.reply_timeout();
        let byte_total = u64::from(self.reference.size);
        let mut bytes_done: u64 = 0;
        for (item, source_path) in items {
            self.cancel.check()?;
            let header = item
                .encode()
                .map_err(|_| TransferError::ProtocolViolation { stage: "item header" })?;
            transport::write_all_timeout(&mut stream, &header, deadline)
                .await
                .map_err(at_stage("item header"))?;
            let Some(path) = source_path else {
                continue; // folders need no payload
            };
            let mut action_buf = [0u8; 2];
            transport::read_exact_timeout(&mut stream, &mut action_buf, deadline)
                .await
                .map_err(at_stage("action"))?;
            let action = u16::from_be_bytes(action_buf);
            match action {
                ACTION_NEXT_FILE => {
                    debug!(%path, "server skipped file");
                    continue;
                }
                ACTION_SEND_FILE => {}
                ACTION_RESUME_FILE => {
                    // The resume action's reference semantics were never
                    // settled; the configured policy decides.
                    match self.config.resume_policy {
                        ResumePolicy::RestartFromZero => {}
                    }
                }
                _ => return Err(TransferError::ProtocolViolation { stage: "action" }),
            }
            bytes_done = self
                .send_flat_file(&mut stream, &path, bytes_done, byte_total)
                .await?;
        }
        Ok(())
    }

    async fn send_flat_file(
        &mut self,
        stream: &mut TcpStream,
        path: &Utf8Path,
        mut bytes_done: u64,
        byte_total: u64,
    ) -> Result<u64, TransferError> {
        let deadline = self.config.reply_timeout();
        let plan = plan_flat(path).await?;
        let flat_size = u32::try_from(plan.total)
            .map_err(|_| TransferError::ProtocolViolation { stage: "flatten" })?;
        transport::write_all_timeout(stream, &flat_size.to_be_bytes(), deadline)
            .await
            .map_err(at_stage("file size"))?;

        let fork_count = if plan.resource.is_some() { 3 } else { 2 };
        let envelope = filp::Envelope {
            version: filp::FILP_VERSION,
            fork_count,
        };
        transport::write_all_timeout(stream, &envelope.encode(), deadline)
            .await
            .map_err(at_stage("envelope"))?;
        let info_header = filp::ForkHeader {
            fork_type: filp::FORK_INFO,
            flags: 0,
            data_size: u32::try_from(plan.info.len())
                .map_err(|_| TransferError::ProtocolViolation { stage: "info fork" })?,
        };
        transport::write_all_timeout(stream, &info_header.encode(), deadline)
            .await
            .map_err(at_stage("info fork"))?;
        transport::write_all_timeout(stream, &plan.info, deadline)
            .await
            .map_err(at_stage("info fork"))?;
        let data_header = filp::ForkHeader {
            fork_type: filp::FORK_DATA,
            flags: 0,
            data_size: u32::try_from(plan.data_len)
                .map_err(|_| TransferError::ProtocolViolation { stage: "data fork" })?,
        };
        transport::write_all_timeout(stream, &data_header.encode(), deadline)
            .await
            .map_err(at_stage("data fork"))?;

        let name = path.file_name().unwrap_or("upload").to_owned();
        let mut file = fs::File::open(path).await?;
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
            transport::write_all_timeout(stream, slice, deadline)
                .await
                .map_err(at_stage("data fork"))?;
            sent += take as u64;
            bytes_done += take as u64;
            self.progress.transferred(&name, bytes_done, byte_total);
        }
        if let Some(resource) = &plan.resource {
            let macr_header = filp::ForkHeader {
                fork_type: filp::FORK_MACR,
                flags: 0,
                data_size: u32::try_from(resource.len())
                    .map_err(|_| TransferError::ProtocolViolation { stage: "resource fork" })?,
            };
            transport::write_all_timeout(stream, &macr_header.encode(), deadline)
                .await
                .map_err(at_stage("resource fork"))?;
            transport::write_all_timeout(stream, resource, deadline)
                .await
                .map_err(at_stage("resource fork"))?;
        }
        Ok(bytes_done)
    }
}

async fn write_action(
    stream: &mut TcpStream,
    action: u16,
    deadline: std::time::Duration,
) -> Result<(), TransferError> {
    transport::write_all_timeout(stream, &action.to_be_bytes(), deadline)
        .await
        .map_err(at_stage("action"))
}

/// Join validated item path components, refusing traversal tricks.
fn relative_item_path(components: &[String]) -> Option<Utf8PathBuf> {
    if components.is_empty() {
        return None;
    }
    let mut path = Utf8PathBuf::new();
    for component in components {
        if component.is_empty()
            || component == "."
            || component == ".."
            || component.contains('/')
            || component.contains('\\')
        {
            return None;
        }
        path.push(component);
    }
    Some(path)
}

/// Walk `root` depth-first in lexicographic order.
///
/// Directories are announced before their contents; paths are relative to
/// `root`, which itself is not announced.
fn walk_folder(root: &Utf8Path) -> Result<Vec<(FolderItem, Option<Utf8PathBuf>)>, TransferError> {
    fn visit(
        dir: &Utf8Path,
        rel: &[String],
        out: &mut Vec<(FolderItem, Option<Utf8PathBuf>)>,
    ) -> std::io::Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir.as_std_path())?
            .collect::<Result<_, _>>()?;
        entries.sort_by_key(std::fs::DirEntry::file_name);
        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            let mut item_rel = rel.to_vec();
            item_rel.push(name.clone());
            let path = dir.join(&name);
            if entry.file_type()?.is_dir() {
                out.push((
                    FolderItem {
                        kind: FolderItemKind::Folder,
                        path: item_rel.clone(),
                    },
                    None,
                ));
                visit(&path, &item_rel, out)?;
            } else {
                out.push((
                    FolderItem {
                        kind: FolderItemKind::File,
                        path: item_rel,
                    },
                    Some(path),
                ));
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    visit(root, &[], &mut out)?;
    Ok(out)
}
