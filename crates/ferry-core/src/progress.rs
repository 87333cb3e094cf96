//! Progress reporting between a transfer task and its consumer
//!
//! Each side of a transfer runs on a background task and reports through a
//! single-slot channel: at most one event is pending at a time, and the
//! producer closes the channel after the terminal event by dropping its
//! sender. The consumer re-arms `recv()` after each event until the
//! channel yields `None`.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::{Error, TransferState};

/// One progress report from a running transfer.
///
/// Emitted repeatedly during Transferring/Receiving and exactly once for
/// every other state transition.
#[derive(Debug)]
pub struct ProgressEvent {
    pub state: TransferState,
    /// Bytes sent or received so far.
    pub bytes_moved: u64,
    /// Total size of the file, where the emitting side knows it.
    pub total_bytes: u64,
    /// Average throughput in MB/s since the stream started.
    pub speed: f64,
    /// The session id, on the sender side once the broker has issued it.
    pub session_id: Option<String>,
    /// The failure that terminated the transfer, on Error/Cancelled.
    pub error: Option<Error>,
}

impl ProgressEvent {
    /// A bare state transition.
    pub fn state(state: TransferState) -> Self {
        Self {
            state,
            bytes_moved: 0,
            total_bytes: 0,
            speed: 0.0,
            session_id: None,
            error: None,
        }
    }

    /// The sender has a session and is waiting for its receiver.
    pub fn waiting(session_id: impl Into<String>) -> Self {
        let mut event = Self::state(TransferState::WaitingForReceiver);
        event.session_id = Some(session_id.into());
        event
    }

    /// A mid-stream progress report.
    pub fn progressing(state: TransferState, bytes_moved: u64, total_bytes: u64, speed: f64) -> Self {
        let mut event = Self::state(state);
        event.bytes_moved = bytes_moved;
        event.total_bytes = total_bytes;
        event.speed = speed;
        event
    }

    /// The stream finished; final counts.
    pub fn completed(bytes_moved: u64, total_bytes: u64, speed: f64) -> Self {
        Self::progressing(TransferState::Completed, bytes_moved, total_bytes, speed)
    }

    /// A failure terminated the transfer. The state follows the error's
    /// kind: rejection and cancellation end in Cancelled, the rest in
    /// Error.
    pub fn failed(error: Error) -> Self {
        let mut event = Self::state(error.terminal_state());
        event.error = Some(error);
        event
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Producer half of the progress channel.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSender {
    /// Deliver one event, waiting while the previous one is still pending.
    ///
    /// A consumer that has gone away is not an error for the producer; the
    /// transfer keeps running and the event is discarded.
    pub async fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event).await;
    }
}

/// Consumer half of the progress channel. `recv()` yields `None` once the
/// producer has emitted its terminal event and closed the channel.
pub type ProgressReceiver = mpsc::Receiver<ProgressEvent>;

/// Create the single-slot progress channel for one transfer.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ProgressSender { tx }, rx)
}

/// Run a transfer future on its own task, converting a panic into a
/// terminal Error event instead of letting the channel close silently.
pub async fn supervised<F>(tx: ProgressSender, transfer: F)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(transfer).await {
        if e.is_panic() {
            tx.emit(ProgressEvent::failed(Error::Unexpected(e.to_string())))
                .await;
        }
    }
}

/// The transfer clock: instantaneous average throughput in MB/s.
pub struct Throughput {
    started: Instant,
}

impl Throughput {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Average rate for `bytes` moved since the clock started.
    pub fn rate(&self, bytes: u64) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        bytes as f64 / secs / 1024.0 / 1024.0
    }
}
