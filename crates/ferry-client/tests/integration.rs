//! Integration tests for the Ferry client
//!
//! These spin up a real broker on an ephemeral loopback port and run both
//! transfer engines over real sockets, so the whole
//! create/join/handshake/stream path is exercised end to end.

use std::sync::Arc;

use ferry_broker::registry::SessionRegistry;
use ferry_client::broker::BrokerClient;
use ferry_client::receiver::Receiver;
use ferry_client::sender::Sender;
use ferry_core::{Error, ProgressEvent, ProgressReceiver, TransferState};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn spawn_broker() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(ferry_broker::service::serve(
        listener,
        Arc::new(SessionRegistry::new()),
    ));
    addr.to_string()
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn collect(mut events: ProgressReceiver) -> Vec<ProgressEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.recv().await {
        seen.push(event);
    }
    seen
}

/// Drive the sender past Initializing and WaitingForReceiver, returning
/// the session id it was issued.
async fn await_session_id(events: &mut ProgressReceiver) -> String {
    let first = events.recv().await.unwrap();
    assert_eq!(first.state, TransferState::Initializing);
    let second = events.recv().await.unwrap();
    assert_eq!(second.state, TransferState::WaitingForReceiver);
    second.session_id.clone().expect("session id with waiting state")
}

#[tokio::test]
async fn full_transfer_round_trip() {
    let broker_addr = spawn_broker().await;
    let port = free_port();

    let src_dir = TempDir::new().unwrap();
    let data = patterned(10 * 1024 * 1024);
    let src = src_dir.path().join("payload.bin");
    std::fs::write(&src, &data).unwrap();

    let sender = Sender::new(BrokerClient::new(&broker_addr), port);
    let mut sender_events = sender.spawn(src, CancellationToken::new());
    let session_id = await_session_id(&mut sender_events).await;
    assert!(!session_id.is_empty());
    let sender_task = tokio::spawn(collect(sender_events));

    let dest_dir = TempDir::new().unwrap();
    let receiver = Receiver::new(BrokerClient::new(&broker_addr), format!("127.0.0.1:{port}"));
    let incoming = receiver
        .connect(&session_id, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(incoming.metadata().name, "payload.bin");
    assert_eq!(incoming.metadata().size, data.len() as u64);

    let receiver_events = collect(incoming.accept(dest_dir.path().to_path_buf())).await;
    let sender_events = sender_task.await.unwrap();

    // Sender: Transferring all the way, then exactly one Completed with
    // the full byte count.
    let last = sender_events.last().unwrap();
    assert_eq!(last.state, TransferState::Completed);
    assert_eq!(last.bytes_moved, data.len() as u64);
    assert!(sender_events[..sender_events.len() - 1]
        .iter()
        .all(|e| e.state == TransferState::Transferring));
    assert!(sender_events.len() > 2);

    // Receiver: Initializing, Receiving repeatedly, one Completed.
    assert_eq!(
        receiver_events.first().unwrap().state,
        TransferState::Initializing
    );
    let last = receiver_events.last().unwrap();
    assert_eq!(last.state, TransferState::Completed);
    assert_eq!(last.bytes_moved, data.len() as u64);
    assert!(receiver_events[1..receiver_events.len() - 1]
        .iter()
        .all(|e| e.state == TransferState::Receiving));

    // The destination is byte-identical to the source.
    let received = std::fs::read(dest_dir.path().join("payload.bin")).unwrap();
    assert_eq!(received, data);
}

#[tokio::test]
async fn cancelling_the_receiver_removes_the_partial_file() {
    let broker_addr = spawn_broker().await;
    let port = free_port();

    let src_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("big.bin");
    std::fs::write(&src, patterned(4 * 1024 * 1024)).unwrap();

    let sender = Sender::new(BrokerClient::new(&broker_addr), port);
    let mut sender_events = sender.spawn(src, CancellationToken::new());
    let session_id = await_session_id(&mut sender_events).await;
    let _sender_task = tokio::spawn(collect(sender_events));

    let dest_dir = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let receiver = Receiver::new(BrokerClient::new(&broker_addr), format!("127.0.0.1:{port}"));
    let incoming = receiver.connect(&session_id, &cancel).await.unwrap();

    let mut events = incoming.accept(dest_dir.path().to_path_buf());

    // Let at least one chunk land, then pull the plug.
    loop {
        let event = events.recv().await.unwrap();
        if event.state == TransferState::Receiving && event.bytes_moved > 0 {
            cancel.cancel();
            break;
        }
    }

    // Cancellation is polled per chunk, so a few more Receiving events
    // may slip out; the channel must end with exactly one Cancelled.
    let mut cancelled = 0;
    while let Some(event) = events.recv().await {
        assert!(
            event.state == TransferState::Receiving || event.state == TransferState::Cancelled,
            "unexpected state {:?}",
            event.state
        );
        if event.state == TransferState::Cancelled {
            cancelled += 1;
            assert!(matches!(event.error, Some(Error::Cancelled)));
        }
    }
    assert_eq!(cancelled, 1);

    // The partial file was deleted; nothing is left behind.
    assert_eq!(std::fs::read_dir(dest_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn rejecting_leaves_the_sender_cancelled() {
    let broker_addr = spawn_broker().await;
    let port = free_port();

    let src_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("offer.txt");
    std::fs::write(&src, b"take it or leave it").unwrap();

    let sender = Sender::new(BrokerClient::new(&broker_addr), port);
    let mut sender_events = sender.spawn(src, CancellationToken::new());
    let session_id = await_session_id(&mut sender_events).await;

    let receiver = Receiver::new(BrokerClient::new(&broker_addr), format!("127.0.0.1:{port}"));
    let incoming = receiver
        .connect(&session_id, &CancellationToken::new())
        .await
        .unwrap();
    incoming.reject().await.unwrap();

    // The rejection is terminal for the sender, as Cancelled, not Error.
    let rest = collect(sender_events).await;
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].state, TransferState::Cancelled);
    assert!(matches!(rest[0].error, Some(Error::Rejected)));
}

#[tokio::test]
async fn cancelling_while_waiting_for_receiver() {
    let broker_addr = spawn_broker().await;
    let port = free_port();

    let src_dir = TempDir::new().unwrap();
    let src = src_dir.path().join("file.txt");
    std::fs::write(&src, b"data").unwrap();

    let cancel = CancellationToken::new();
    let sender = Sender::new(BrokerClient::new(&broker_addr), port);
    let mut events = sender.spawn(src, cancel.clone());
    await_session_id(&mut events).await;

    cancel.cancel();

    let terminal = events.recv().await.unwrap();
    assert_eq!(terminal.state, TransferState::Cancelled);
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn broker_client_maps_status_codes() {
    let broker_addr = spawn_broker().await;
    let client = BrokerClient::new(&broker_addr);

    match client.join_session("abcdef").await {
        Err(Error::SessionNotFound(_)) => {}
        other => panic!("expected not-found, got {other:?}"),
    }

    let session = client.create_session().await.unwrap();
    client.join_session(&session.session_id).await.unwrap();
    match client.join_session(&session.session_id).await {
        Err(Error::SessionConflict) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    client.leave_session(&session.session_id).await.unwrap();
    match client.leave_session(&session.session_id).await {
        Err(Error::SessionConflict) => {}
        other => panic!("expected conflict, got {other:?}"),
    }

    // The freed slot is joinable again.
    client.join_session(&session.session_id).await.unwrap();
}

#[tokio::test]
async fn dead_sender_port_fails_to_connect() {
    let broker_addr = spawn_broker().await;
    let client = BrokerClient::new(&broker_addr);
    let session = client.create_session().await.unwrap();

    let receiver = Receiver::new(
        BrokerClient::new(&broker_addr),
        format!("127.0.0.1:{}", free_port()),
    );
    match receiver
        .connect(&session.session_id, &CancellationToken::new())
        .await
    {
        Err(Error::ConnectFailed(_)) => {}
        other => panic!("expected connect failure, got {other:?}"),
    }
}
