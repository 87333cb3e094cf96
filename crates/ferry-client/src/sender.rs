//! Sender-side transfer engine
//!
//! Runs the sender half of the handshake-then-stream protocol on a
//! background task: create a session, wait for the one inbound
//! connection, exchange ready/metadata/accepted, then stream the file in
//! fixed chunks. Progress goes out on the single-slot channel; the
//! cancellation token is polled every chunk and raced against the
//! blocking accept.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ferry_core::connection::DEFAULT_IO_TIMEOUT;
use ferry_core::progress::supervised;
use ferry_core::types::metadata_line;
use ferry_core::{
    progress_channel, Connection, Error, ProgressEvent, ProgressReceiver, ProgressSender, Result,
    Throughput, TransferState, CHUNK_SIZE,
};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerClient;

pub struct Sender {
    broker: BrokerClient,
    listen_port: u16,
    io_timeout: Duration,
}

impl Sender {
    pub fn new(broker: BrokerClient, listen_port: u16) -> Self {
        Self {
            broker,
            listen_port,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Spawn the transfer task for `path`.
    ///
    /// Events arrive on the returned channel, ending with exactly one
    /// terminal event, after which the channel closes.
    pub fn spawn(self, path: PathBuf, cancel: CancellationToken) -> ProgressReceiver {
        let (tx, rx) = progress_channel();
        let supervisor_tx = tx.clone();
        tokio::spawn(supervised(supervisor_tx, async move {
            if let Err(e) = drive(&self, &path, &cancel, &tx).await {
                tx.emit(ProgressEvent::failed(e)).await;
            }
        }));
        rx
    }
}

async fn drive(
    sender: &Sender,
    path: &Path,
    cancel: &CancellationToken,
    tx: &ProgressSender,
) -> Result<()> {
    tx.emit(ProgressEvent::state(TransferState::Initializing))
        .await;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // The file must be readable before a session id is burned on it.
    let mut file = File::open(path).await.map_err(Error::FileAccess)?;
    let file_meta = file.metadata().await.map_err(Error::FileAccess)?;
    if !file_meta.is_file() {
        return Err(Error::FileAccess(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    let total_bytes = file_meta.len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::FileAccess(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?;

    let session = sender.broker.create_session().await?;
    tracing::info!("created session {}", session.session_id);
    tx.emit(ProgressEvent::waiting(session.session_id.clone()))
        .await;

    // Exactly one connection per transfer attempt; the listener is
    // dropped as soon as the receiver is in.
    let listener = TcpListener::bind(("0.0.0.0", sender.listen_port)).await?;
    let (stream, peer) = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        accepted = listener.accept() => accepted?,
    };
    drop(listener);
    tracing::debug!("receiver connected from {peer}");

    let mut conn = Connection::with_timeout(stream, cancel.clone(), sender.io_timeout);

    let ready = conn.read_line().await?;
    if ready != "ready" {
        return Err(Error::Protocol(format!(
            "unexpected response from receiver: {ready}"
        )));
    }

    conn.write_line(&metadata_line(&name, total_bytes)).await?;

    // Anything but an acceptance means the receiver declined.
    let decision = conn.read_line().await?;
    if decision != "accepted" {
        return Err(Error::Rejected);
    }

    tx.emit(ProgressEvent::progressing(
        TransferState::Transferring,
        0,
        total_bytes,
        0.0,
    ))
    .await;

    let clock = Throughput::start();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes_sent: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let n = file.read(&mut buf).await?;
        if n == 0 {
            conn.shutdown().await?;
            tracing::info!("sent {} ({} bytes)", name, bytes_sent);
            tx.emit(ProgressEvent::completed(
                bytes_sent,
                total_bytes,
                clock.rate(bytes_sent),
            ))
            .await;
            return Ok(());
        }

        conn.write_chunk(&buf[..n]).await?;
        bytes_sent += n as u64;
        tx.emit(ProgressEvent::progressing(
            TransferState::Transferring,
            bytes_sent,
            total_bytes,
            clock.rate(bytes_sent),
        ))
        .await;
    }
}
