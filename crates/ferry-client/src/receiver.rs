//! Receiver-side transfer engine
//!
//! Joining and the metadata exchange run in the caller's task so the
//! caller can look at what is being offered before accepting; the chunk
//! loop then runs on a background task reporting through the progress
//! channel. A cancelled receive deletes the partial file; an I/O failure
//! keeps it.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ferry_core::connection::DEFAULT_IO_TIMEOUT;
use ferry_core::progress::supervised;
use ferry_core::{
    progress_channel, Connection, Error, FileMetadata, ProgressEvent, ProgressReceiver,
    ProgressSender, Result, Session, Throughput, TransferState, CHUNK_SIZE,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::broker::BrokerClient;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Receiver {
    broker: BrokerClient,
    transfer_addr: String,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl Receiver {
    /// `transfer_addr` is the well-known `host:port` the sender listens on.
    pub fn new(broker: BrokerClient, transfer_addr: String) -> Self {
        Self {
            broker,
            transfer_addr,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Join the session and run the handshake up to the metadata line.
    ///
    /// Returns the pending transfer for the caller to accept or reject.
    /// Malformed ids fail locally; broker failures keep their distinct
    /// kinds so "broker unreachable" never masquerades as "bad id".
    pub async fn connect(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<IncomingTransfer> {
        let session = self.broker.join_session(session_id).await?;
        tracing::info!("joined session {}", session.session_id);

        let stream = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            dialed = tokio::time::timeout(
                self.connect_timeout,
                TcpStream::connect(&self.transfer_addr),
            ) => match dialed {
                Err(_) => return Err(Error::Timeout),
                Ok(Err(e)) => return Err(Error::ConnectFailed(e.to_string())),
                Ok(Ok(stream)) => stream,
            },
        };
        let sender_address = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();

        let mut conn = Connection::with_timeout(stream, cancel.clone(), self.io_timeout);
        conn.write_line("ready").await?;
        let line = conn.read_line().await?;
        let metadata = FileMetadata::parse_line(&line, sender_address)?;

        Ok(IncomingTransfer {
            conn,
            metadata,
            session,
            cancel: cancel.clone(),
        })
    }
}

/// A transfer offer whose metadata has arrived, awaiting the caller's
/// accept/reject decision.
#[derive(Debug)]
pub struct IncomingTransfer {
    conn: Connection<TcpStream>,
    metadata: FileMetadata,
    session: Session,
    cancel: CancellationToken,
}

impl IncomingTransfer {
    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Decline the offer; the sender sees a rejected transfer, not an
    /// error.
    pub async fn reject(mut self) -> Result<()> {
        self.conn.write_line("rejected").await
    }

    /// Accept the offer and stream the file into `dest_dir` on a
    /// background task.
    pub fn accept(self, dest_dir: PathBuf) -> ProgressReceiver {
        let (tx, rx) = progress_channel();
        let supervisor_tx = tx.clone();
        tokio::spawn(supervised(supervisor_tx, run(self, dest_dir, tx)));
        rx
    }
}

async fn run(transfer: IncomingTransfer, dest_dir: PathBuf, tx: ProgressSender) {
    let IncomingTransfer {
        mut conn,
        metadata,
        cancel,
        ..
    } = transfer;

    tx.emit(ProgressEvent::state(TransferState::Initializing))
        .await;

    if let Err(e) = conn.write_line("accepted").await {
        tx.emit(ProgressEvent::failed(e)).await;
        return;
    }

    let dest = destination_path(&dest_dir, &metadata.name);
    let mut file = match File::create(&dest).await {
        Ok(file) => file,
        Err(e) => {
            tx.emit(ProgressEvent::failed(Error::FileAccess(e))).await;
            return;
        }
    };
    tracing::debug!("receiving into {}", dest.display());

    tx.emit(ProgressEvent::state(TransferState::Receiving)).await;

    let clock = Throughput::start();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes_received: u64 = 0;

    let outcome: Result<()> = loop {
        if cancel.is_cancelled() {
            break Err(Error::Cancelled);
        }

        let n = match conn.read_chunk(&mut buf).await {
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        if n == 0 {
            // Peer closed its write side: end of stream.
            break Ok(());
        }

        if let Err(e) = file.write_all(&buf[..n]).await {
            break Err(e.into());
        }
        bytes_received += n as u64;
        tx.emit(ProgressEvent::progressing(
            TransferState::Receiving,
            bytes_received,
            metadata.size,
            clock.rate(bytes_received),
        ))
        .await;
    };

    let outcome = match outcome {
        Ok(()) => file.flush().await.map_err(Error::from),
        err => err,
    };

    match outcome {
        Ok(()) => {
            drop(file);
            tracing::info!("received {} ({} bytes)", metadata.name, bytes_received);
            tx.emit(ProgressEvent::completed(
                bytes_received,
                metadata.size,
                clock.rate(bytes_received),
            ))
            .await;
        }
        Err(error) => {
            drop(file);
            if matches!(error, Error::Cancelled) {
                // Partial data must not survive under a name that looks
                // like a completed transfer. On plain I/O failures the
                // partial file is deliberately kept.
                let _ = std::fs::remove_file(&dest);
            }
            let mut event = ProgressEvent::failed(error);
            event.bytes_moved = bytes_received;
            event.total_bytes = metadata.size;
            event.speed = clock.rate(bytes_received);
            tx.emit(event).await;
        }
    }
}

/// Where to write the incoming file. An existing file under the offered
/// name is never clobbered; a Unix timestamp goes in before the
/// extension instead.
fn destination_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let offered = Path::new(name);
    let stem = offered
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    match offered.extension() {
        Some(ext) => dir.join(format!("{stem}_{stamp}.{}", ext.to_string_lossy())),
        None => dir.join(format!("{stem}_{stamp}")),
    }
}
