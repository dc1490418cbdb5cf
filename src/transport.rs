//! Async TCP plumbing shared by the control, transfer, and tracker channels.
//!
//! The transport layer knows nothing about frames. It provides connecting
//! with a deadline, exact-length reads, and buffered writes over any
//! `AsyncRead`/`AsyncWrite` pair so the protocol layers above stay testable
//! against in-memory streams.

use std::time::Duration;

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::transaction::TransactionError;

async fn io_with_timeout<F, T>(timeout_dur: Duration, operation: F) -> Result<T, TransactionError>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    timeout(timeout_dur, operation)
        .await
        .map_err(|_| TransactionError::Timeout)?
        .map_err(Into::into)
}

/// Open a TCP connection within the given deadline.
///
/// # Errors
/// Returns [`TransactionError::Timeout`] when the deadline elapses, or the
/// underlying I/O error.
#[must_use = "handle the result"]
pub async fn connect(
    host: &str,
    port: u16,
    deadline: Duration,
) -> Result<TcpStream, TransactionError> {
    let stream = io_with_timeout(deadline, TcpStream::connect((host, port))).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Read exactly `buf.len()` bytes within the given deadline.
///
/// # Errors
/// Returns [`TransactionError::Timeout`] when the deadline elapses, or the
/// underlying I/O error (including unexpected EOF).
#[must_use = "handle the result"]
pub async fn read_exact_timeout<R: AsyncRead + Unpin>(
    r: &mut R,
    buf: &mut [u8],
    deadline: Duration,
) -> Result<(), TransactionError> {
    io_with_timeout(deadline, r.read_exact(buf)).await.map(|_| ())
}

/// Write the whole buffer within the given deadline.
///
/// # Errors
/// Returns [`TransactionError::Timeout`] when the deadline elapses, or the
/// underlying I/O error.
#[must_use = "handle the result"]
pub async fn write_all_timeout<W: AsyncWrite + Unpin>(
    w: &mut W,
    buf: &[u8],
    deadline: Duration,
) -> Result<(), TransactionError> {
    io_with_timeout(deadline, w.write_all(buf)).await?;
    io_with_timeout(deadline, w.flush()).await
}
