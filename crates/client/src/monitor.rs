//! The single consumer that owns the ledger.
//!
//! Everything that changes observer state (connection transitions, decoded
//! events, decode failures, user clears) goes through one queue and is
//! handled to completion before the next input. Readers only ever see the
//! [`MonitorView`] published after an input was fully applied.

use tokio::sync::{mpsc, watch};
use txlens_core::{DecodeError, Ledger, Reconciler, RefreshSignal, Snapshot, TransactionEvent};

use crate::ingest::ConnectionState;

/// One unit of work for the monitor.
#[derive(Debug)]
pub enum MonitorInput {
    Connection(ConnectionState),
    Event(TransactionEvent),
    Diagnostic(DecodeError),
    /// Drop every event and transaction seen so far.
    Clear,
}

/// Counters for inputs that never reached the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub decode_failures: u64,
    /// Events that arrived after the connection closed.
    pub dropped_after_close: u64,
    pub last_error: Option<String>,
}

/// What readers see: connection state, ledger snapshot and diagnostics, all
/// taken after the same input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorView {
    pub connection: ConnectionState,
    /// Which connection `connection` describes. Starts at 0 and moves on
    /// whenever a connection starts after the previous one closed.
    pub connection_seq: u64,
    pub snapshot: Snapshot,
    pub diagnostics: Diagnostics,
}

/// Receiver of refresh signals. Must not block.
pub trait RefreshSink: Send + 'static {
    fn request_refresh(&self, signal: RefreshSignal);
}

impl RefreshSink for () {
    fn request_refresh(&self, _signal: RefreshSignal) {}
}

pub struct Monitor<R> {
    reconciler: Reconciler,
    ledger: Ledger,
    connection: ConnectionState,
    connection_seq: u64,
    diagnostics: Diagnostics,
    refresh: R,
    view: watch::Sender<MonitorView>,
}

impl<R: RefreshSink> Monitor<R> {
    #[must_use]
    pub fn new(reconciler: Reconciler, refresh: R) -> (Self, watch::Receiver<MonitorView>) {
        let (view, receiver) = watch::channel(MonitorView::default());
        let monitor = Self {
            reconciler,
            ledger: Ledger::new(),
            connection: ConnectionState::default(),
            connection_seq: 0,
            diagnostics: Diagnostics::default(),
            refresh,
            view,
        };
        (monitor, receiver)
    }

    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Apply one input and publish the resulting view.
    pub fn handle(&mut self, input: MonitorInput) {
        match input {
            MonitorInput::Connection(state) => {
                tracing::debug!(from = %self.connection, to = %state, "connection state");
                if self.connection.is_closed() && !state.is_closed() {
                    self.connection_seq += 1;
                }
                self.connection = state;
            }
            MonitorInput::Event(event) if self.connection.is_closed() => {
                tracing::debug!(id = %event.id, "dropping event received after close");
                self.diagnostics.dropped_after_close += 1;
            }
            MonitorInput::Event(event) => {
                let ledger = std::mem::take(&mut self.ledger);
                let (ledger, outcome) = self.reconciler.reconcile(ledger, event);
                self.ledger = ledger;
                if let Some(signal) = outcome.refresh {
                    self.refresh.request_refresh(signal);
                }
            }
            MonitorInput::Diagnostic(err) => {
                self.diagnostics.decode_failures += 1;
                self.diagnostics.last_error = Some(err.to_string());
            }
            MonitorInput::Clear => self.ledger.clear(),
        }
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(MonitorView {
            connection: self.connection.clone(),
            connection_seq: self.connection_seq,
            snapshot: self.ledger.snapshot(),
            diagnostics: self.diagnostics.clone(),
        });
    }

    /// Handle inputs until every sender is dropped, then hand back the ledger.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<MonitorInput>) -> Ledger {
        while let Some(input) = inbox.recv().await {
            self.handle(input);
        }
        tracing::debug!(events = self.ledger.log().len(), "monitor stopped");
        self.ledger
    }
}
