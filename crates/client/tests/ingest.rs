//! Frame sequencing through [`ingest`], without a real socket.

mod common;

use std::convert::Infallible;

use futures::stream;
use tokio::sync::{mpsc, watch};
use txlens_client::{ingest, ConnectionState, Frame, MonitorInput};
use txlens_core::{DecodeError, EventKind};

use common::{text, transfer};

fn drain(queue: &mut mpsc::Receiver<MonitorInput>) -> Vec<MonitorInput> {
    let mut inputs = Vec::new();
    while let Ok(input) = queue.try_recv() {
        inputs.push(input);
    }
    inputs
}

fn is_closed(input: &MonitorInput) -> bool {
    matches!(input, MonitorInput::Connection(ConnectionState::Closed { .. }))
}

#[tokio::test]
async fn frames_arrive_between_open_and_closed() {
    let (inbox, mut queue) = mpsc::channel(16);
    let (_stop, shutdown) = watch::channel(false);

    let mut frames = transfer();
    frames.push(Ok(Frame::Control));
    frames.push(Ok(Frame::Close));
    frames.push(text(r#"{"id":"t2","type":"transaction_started","timestamp":5}"#));

    let state = ingest(stream::iter(frames), &inbox, shutdown).await;
    assert_eq!(state, ConnectionState::Closed { failure: None });

    let inputs = drain(&mut queue);
    assert_eq!(inputs.len(), 5, "open, three events, closed: {inputs:?}");
    assert!(matches!(
        inputs[0],
        MonitorInput::Connection(ConnectionState::Open)
    ));
    let kinds: Vec<_> = inputs[1..4]
        .iter()
        .map(|input| match input {
            MonitorInput::Event(event) => event.kind.wire_name(),
            other => panic!("expected an event, got {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        ["transaction_started", "query_executed", "transaction_committed"]
    );
    assert!(is_closed(&inputs[4]));
}

#[tokio::test]
async fn transport_error_closes_with_failure() {
    let (inbox, mut queue) = mpsc::channel(16);
    let (_stop, shutdown) = watch::channel(false);
    let frames: Vec<Result<Frame, String>> = vec![
        Ok(Frame::Text(
            r#"{"id":"t1","type":"transaction_committed","timestamp":1}"#.to_string(),
        )),
        Err("connection reset by peer".to_string()),
        Ok(Frame::Text("never read".to_string())),
    ];

    let state = ingest(stream::iter(frames), &inbox, shutdown).await;
    assert_eq!(
        state,
        ConnectionState::Closed {
            failure: Some("connection reset by peer".to_string())
        }
    );

    let inputs = drain(&mut queue);
    assert_eq!(inputs.len(), 3);
    assert_eq!(inputs.iter().filter(|input| is_closed(input)).count(), 1);
}

#[tokio::test]
async fn undecodable_frames_become_diagnostics() {
    let (inbox, mut queue) = mpsc::channel(16);
    let (_stop, shutdown) = watch::channel(false);
    let frames: Vec<Result<Frame, Infallible>> = vec![
        text("not json"),
        Ok(Frame::Binary(vec![0xff, 0xfe])),
        Ok(Frame::Binary(
            br#"{"id":"t1","type":"transaction_rollbacked","timestamp":2}"#.to_vec(),
        )),
        text(r#"{"id":"t1","type":"transaction_paused","timestamp":3}"#),
    ];

    ingest(stream::iter(frames), &inbox, shutdown).await;
    let inputs = drain(&mut queue);

    assert!(matches!(
        inputs[1],
        MonitorInput::Diagnostic(DecodeError::Malformed(_))
    ));
    assert!(matches!(
        inputs[2],
        MonitorInput::Diagnostic(DecodeError::NotText)
    ));
    assert!(matches!(
        &inputs[3],
        MonitorInput::Event(event) if event.kind == EventKind::Rollbacked
    ));
    assert!(matches!(
        &inputs[4],
        MonitorInput::Diagnostic(DecodeError::UnknownKind(kind)) if kind == "transaction_paused"
    ));
    assert!(is_closed(&inputs[5]));
}

#[tokio::test]
async fn shutdown_stops_an_idle_stream() {
    let (inbox, mut queue) = mpsc::channel(16);
    let (stop, shutdown) = watch::channel(false);

    let task = tokio::spawn(async move {
        ingest(
            stream::pending::<Result<Frame, Infallible>>(),
            &inbox,
            shutdown,
        )
        .await
    });
    assert!(matches!(
        queue.recv().await,
        Some(MonitorInput::Connection(ConnectionState::Open))
    ));

    stop.send_replace(true);
    let state = task.await.unwrap();
    assert_eq!(state, ConnectionState::Closed { failure: None });
    assert!(matches!(queue.recv().await, Some(input) if is_closed(&input)));
    assert!(queue.recv().await.is_none(), "nothing after closed");
}

#[tokio::test]
async fn shutdown_before_start_reads_nothing() {
    let (inbox, mut queue) = mpsc::channel(16);
    let (_stop, shutdown) = watch::channel(true);

    let state = ingest(stream::iter(transfer()), &inbox, shutdown).await;
    assert_eq!(state, ConnectionState::Closed { failure: None });

    let inputs = drain(&mut queue);
    assert_eq!(inputs.len(), 2);
    assert!(is_closed(&inputs[1]));
}
