//! Core data types for Ferry

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A rendezvous session held by the broker.
///
/// Binds a short opaque session id to a sender and, once someone has
/// joined, at most one receiver. An empty `receiver_id` means the session
/// has no receiver attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub receiver_id: String,
}

impl Session {
    pub fn has_receiver(&self) -> bool {
        !self.receiver_id.is_empty()
    }
}

/// Metadata describing the file offered by the sender.
///
/// Built by the receiver from the single metadata line of the handshake;
/// immutable afterwards. Only used to size the destination file and to
/// compute percentage progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    pub size: u64,
    pub sender_address: String,
}

impl FileMetadata {
    /// Parse one metadata handshake line (`<name>|<size>`).
    ///
    /// A trailing newline is tolerated. Splits on the first `|`: a file
    /// name containing `|` or a newline corrupts the framing. Known
    /// limitation of the wire format.
    pub fn parse_line(line: &str, sender_address: impl Into<String>) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (name, size) = line
            .split_once('|')
            .ok_or_else(|| Error::Protocol(format!("invalid file info: {line}")))?;
        if name.is_empty() {
            return Err(Error::Protocol("empty file name in file info".to_string()));
        }
        let size = size
            .parse::<u64>()
            .map_err(|e| Error::Protocol(format!("failed to parse file size '{size}': {e}")))?;
        Ok(Self {
            name: name.to_string(),
            size,
            sender_address: sender_address.into(),
        })
    }

    /// The wire form of this metadata (newline added at send time).
    pub fn to_line(&self) -> String {
        metadata_line(&self.name, self.size)
    }
}

/// Format the metadata handshake line sent ahead of the byte stream.
pub fn metadata_line(name: &str, size: u64) -> String {
    format!("{name}|{size}")
}

/// The states a transfer moves through.
///
/// Exactly one is current per active transfer. Completed, Error and
/// Cancelled are terminal: no transition or progress event follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Initializing,
    WaitingForReceiver,
    Transferring,
    Receiving,
    Completed,
    Error,
    Cancelled,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}
