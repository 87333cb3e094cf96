//! Error types for Ferry

use thiserror::Error;

use crate::types::TransferState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to access file: {0}")]
    FileAccess(std::io::Error),

    #[error("could not reach the broker: {0}")]
    BrokerUnreachable(String),

    #[error("session '{0}' not found - check the ID and try again")]
    SessionNotFound(String),

    #[error("session already has an active receiver")]
    SessionConflict,

    #[error("invalid session ID '{0}'")]
    InvalidSessionId(String),

    #[error("unexpected broker response (status {status}): {message}")]
    Broker { status: u16, message: String },

    #[error("connection timed out - please try again")]
    Timeout,

    #[error("couldn't connect to sender - are they still online? ({0})")]
    ConnectFailed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transfer was rejected by receiver")]
    Rejected,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// The terminal state a transfer ends in when this error stops it.
    ///
    /// A receiver declining and a caller-initiated abort both end in
    /// Cancelled; everything else is an Error.
    pub fn terminal_state(&self) -> TransferState {
        match self {
            Error::Rejected | Error::Cancelled => TransferState::Cancelled,
            _ => TransferState::Error,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
