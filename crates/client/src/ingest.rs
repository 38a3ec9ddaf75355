//! Turning transport frames into monitor inputs.
//!
//! [`ingest`] is transport-agnostic: it reads any stream of [`Frame`]s.
//! [`connect`] wires it to a WebSocket.

use core::fmt::Display;

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use txlens_core::{decode, DecodeError};

use crate::monitor::MonitorInput;

/// Lifecycle of the event stream connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Open,
    /// Closed for good. `failure` is set when the transport errored rather
    /// than closing normally.
    Closed { failure: Option<String> },
}

impl ConnectionState {
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    fn closed(failure: Option<String>) -> Self {
        Self::Closed { failure }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed { failure: None } => f.write_str("closed"),
            Self::Closed {
                failure: Some(failure),
            } => write!(f, "failed: {failure}"),
        }
    }
}

/// One frame off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
    /// Ping, pong and other frames carrying no event.
    Control,
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Self::Text(text),
            Message::Binary(bytes) => Self::Binary(bytes),
            Message::Close(_) => Self::Close,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Self::Control,
        }
    }
}

fn to_input(text: &str) -> MonitorInput {
    match decode(text) {
        Ok(event) => MonitorInput::Event(event),
        Err(err) => {
            tracing::warn!(%err, "dropping undecodable message");
            MonitorInput::Diagnostic(err)
        }
    }
}

/// Read `frames` until the stream ends, fails, closes or `shutdown` flips
/// to `true`, posting one input per data frame to `inbox`.
///
/// `Connection(Open)` is posted first and exactly one `Connection(Closed)`
/// last; nothing is read after that. Returns the closed state.
pub async fn ingest<S, E>(
    mut frames: S,
    inbox: &mpsc::Sender<MonitorInput>,
    mut shutdown: watch::Receiver<bool>,
) -> ConnectionState
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let final_state = 'read: {
        if inbox
            .send(MonitorInput::Connection(ConnectionState::Open))
            .await
            .is_err()
        {
            break 'read ConnectionState::closed(None);
        }
        tracing::info!("event stream open");

        if *shutdown.borrow_and_update() {
            break 'read ConnectionState::closed(None);
        }

        loop {
            let input = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        tracing::debug!("shutdown requested");
                        break 'read ConnectionState::closed(None);
                    }
                    continue;
                }
                frame = frames.next() => match frame {
                    None | Some(Ok(Frame::Close)) => break 'read ConnectionState::closed(None),
                    Some(Err(err)) => {
                        tracing::warn!(%err, "event stream failed");
                        break 'read ConnectionState::closed(Some(err.to_string()));
                    }
                    Some(Ok(Frame::Control)) => continue,
                    Some(Ok(Frame::Text(text))) => to_input(&text),
                    Some(Ok(Frame::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => to_input(&text),
                        Err(_) => {
                            tracing::warn!("dropping binary frame that is not UTF-8");
                            MonitorInput::Diagnostic(DecodeError::NotText)
                        }
                    },
                },
            };
            if inbox.send(input).await.is_err() {
                tracing::debug!("monitor gone, stopping ingest");
                break 'read ConnectionState::closed(None);
            }
        }
    };

    tracing::info!(state = %final_state, "event stream closed");
    let _ = inbox
        .send(MonitorInput::Connection(final_state.clone()))
        .await;
    final_state
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Open a WebSocket to `url` and [`ingest`] it.
///
/// Posts `Connection(Connecting)` before dialing. A failed handshake posts
/// `Closed` with the failure. A close frame is sent on local shutdown.
/// There is no reconnection here.
pub async fn connect(
    url: String,
    inbox: mpsc::Sender<MonitorInput>,
    shutdown: watch::Receiver<bool>,
) -> ConnectionState {
    dial(url, inbox, shutdown, None).await
}

/// Like [`connect`], also copying every text message, decodable or not,
/// to `tap` before it is decoded.
pub async fn connect_recording(
    url: String,
    inbox: mpsc::Sender<MonitorInput>,
    shutdown: watch::Receiver<bool>,
    tap: mpsc::UnboundedSender<String>,
) -> ConnectionState {
    dial(url, inbox, shutdown, Some(tap)).await
}

async fn dial(
    url: String,
    inbox: mpsc::Sender<MonitorInput>,
    mut shutdown: watch::Receiver<bool>,
    tap: Option<mpsc::UnboundedSender<String>>,
) -> ConnectionState {
    let _ = inbox
        .send(MonitorInput::Connection(ConnectionState::Connecting))
        .await;
    tracing::info!(%url, "connecting to event stream");

    let dialed = tokio::select! {
        biased;
        () = stopped(&mut shutdown) => None,
        dialed = tokio_tungstenite::connect_async(url.as_str()) => Some(dialed),
    };

    let socket = match dialed {
        Some(Ok((socket, _))) => socket,
        Some(Err(err)) => {
            tracing::warn!(%url, %err, "could not open event stream");
            let state = ConnectionState::closed(Some(err.to_string()));
            let _ = inbox.send(MonitorInput::Connection(state.clone())).await;
            return state;
        }
        None => {
            let state = ConnectionState::closed(None);
            let _ = inbox.send(MonitorInput::Connection(state.clone())).await;
            return state;
        }
    };

    let (mut sink, source) = socket.split();
    let frames = source.map(move |message| {
        if let (Some(tap), Ok(Message::Text(text))) = (&tap, &message) {
            let _ = tap.send(text.clone());
        }
        message.map(Frame::from)
    });
    let state = ingest(frames, &inbox, shutdown.clone()).await;

    if *shutdown.borrow() {
        if let Err(err) = sink.send(Message::Close(None)).await {
            tracing::debug!(%err, "close frame not delivered");
        }
    }
    state
}
