//! Ferry Core - Shared types, wire protocol, and transfer plumbing
//!
//! This crate provides the building blocks shared by the Ferry broker and
//! client: session and file metadata types, the handshake line codec, the
//! error taxonomy, the cancellable connection wrapper, and the progress
//! channel that bridges a transfer task to its consumer.

pub mod connection;
pub mod error;
pub mod id;
pub mod progress;
pub mod types;

pub use connection::Connection;
pub use error::{Error, Result};
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender, Throughput};
pub use types::{FileMetadata, Session, TransferState};

/// Bytes moved per read/write cycle. Progress is recomputed and
/// cancellation polled at this granularity.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Well-known broker address.
pub const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:3000";

/// Well-known port the sender listens on for the direct connection.
pub const DEFAULT_TRANSFER_PORT: u16 = 3001;
