//! Byte-stream transport wrapper with deadlines and cancellation
//!
//! Wraps a raw bidirectional stream so every blocking read or write is
//! raced against a per-operation deadline and the transfer's cancellation
//! scope. Generic over the stream type, so tests can run the full
//! handshake over in-memory duplex pipes instead of real sockets.

use std::future::Future;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Default per-operation deadline. Renewed on every operation; there is no
/// whole-transfer deadline.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// A bidirectional byte stream with an associated cancellation scope.
#[derive(Debug)]
pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    cancel: CancellationToken,
    timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    pub fn new(stream: S, cancel: CancellationToken) -> Self {
        Self::with_timeout(stream, cancel, DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(stream: S, cancel: CancellationToken, timeout: Duration) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
            cancel,
            timeout,
        }
    }

    /// Whether the cancellation scope has been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for a single newline-terminated response.
    ///
    /// The read is raced against the per-operation deadline and the
    /// cancellation scope; a silent peer yields the distinct
    /// [`Error::Timeout`] kind. The trailing newline is stripped.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = with_deadline(
            self.cancel.clone(),
            self.timeout,
            self.reader.read_line(&mut line),
        )
        .await?;
        if n == 0 {
            return Err(Error::Protocol(
                "connection closed before response".to_string(),
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Send one line, newline-terminated.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        with_deadline(self.cancel.clone(), self.timeout, async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await
        })
        .await
    }

    /// Write one chunk of the raw byte stream verbatim.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        with_deadline(
            self.cancel.clone(),
            self.timeout,
            self.writer.write_all(chunk),
        )
        .await
    }

    /// Read up to `buf.len()` bytes of the raw byte stream.
    ///
    /// Returns 0 once the peer has closed its write side.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        with_deadline(self.cancel.clone(), self.timeout, self.reader.read(buf)).await
    }

    /// Close our write side so the peer observes end-of-stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Into::into)
    }
}

/// Race one I/O operation against the deadline and the cancellation scope.
async fn with_deadline<T>(
    cancel: CancellationToken,
    deadline: Duration,
    op: impl Future<Output = std::io::Result<T>>,
) -> Result<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        res = tokio::time::timeout(deadline, op) => match res {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::Timeout),
        },
    }
}
