//! Client-side reconciliation of database transaction event streams.
//!
//! A backend executes SQL under configurable isolation levels and emits one
//! event per lifecycle moment of each transaction:
//!
//! 1. **started** -- founds the transaction and fixes its isolation level.
//! 2. **query executed** -- a statement ran inside the transaction.
//! 3. **committed** / **rollbacked** -- terminal; nothing moves it afterwards.
//!
//! `txlens_core` turns that stream into two consistent views: the flat log
//! of every event in receipt order, and the current status of every
//! transaction keyed by id. It mirrors whatever the backend reports,
//! including anomalies the backend induces on purpose; it never infers
//! transaction boundaries from query text.
//!
//! # Entry point
//!
//! [`decode`] parses a wire message; [`Reconciler::reconcile`] folds it into
//! a [`Ledger`]; [`Ledger::snapshot`] hands out an immutable [`Snapshot`]
//! for readers.
//!
//! ```rust,ignore
//! use txlens_core::{decode, Ledger, Reconciler};
//!
//! let reconciler = Reconciler::default();
//! let mut ledger = Ledger::new();
//! for line in messages {
//!     match decode(line) {
//!         Ok(event) => {
//!             let (next, outcome) = reconciler.reconcile(ledger, event);
//!             ledger = next;
//!             if outcome.refresh.is_some() {
//!                 schedule_refresh();
//!             }
//!         }
//!         Err(err) => eprintln!("dropped: {err}"),
//!     }
//! }
//! let view = ledger.snapshot();
//! ```
//!
//! # Crate features
//!
//! - **`schemars`** -- derives `JsonSchema` for [`WireMessage`].
//!
//! This crate is `no_std` compatible (requires `alloc`).

#![cfg_attr(not(any(test, feature = "schemars")), no_std)]
extern crate alloc;

pub mod event;
pub mod log;
pub mod projection;
pub mod reconciler;
pub mod registry;

pub use event::{
    decode, encode, DecodeError, EventKind, IsolationLevel, TransactionEvent, TransactionId,
    WireMessage,
};
pub use log::{ChunkedLog, EventLog};
pub use projection::{Snapshot, StatusCounts};
pub use reconciler::{Ledger, Reconciler, Reconciliation, RefreshPolicy, RefreshSignal};
pub use registry::{TransactionRegistry, TransactionState, TransactionStatus, Upsert};
