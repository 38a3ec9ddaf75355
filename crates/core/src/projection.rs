//! Read-side views over a [`Ledger`](crate::reconciler::Ledger).
//!
//! A [`Snapshot`] is detached from the ledger it came from: later events
//! and clears do not reach it. Deriving a projection twice from the same
//! snapshot yields equal values.

use alloc::vec::Vec;

use crate::event::types::TransactionId;
use crate::log::EventLog;
use crate::registry::{TransactionRegistry, TransactionState, TransactionStatus};

/// Immutable copy of the ledger at one point in the event sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    registry: TransactionRegistry,
    log: EventLog,
}

/// Number of known transactions per status.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub active: usize,
    pub committed: usize,
    pub rollbacked: usize,
}

impl Snapshot {
    pub(crate) const fn new(registry: TransactionRegistry, log: EventLog) -> Self {
        Self { registry, log }
    }

    /// Every event in receipt order, unfiltered.
    #[must_use]
    pub const fn full_log(&self) -> &EventLog {
        &self.log
    }

    /// Current state of every known transaction, in first-seen order.
    #[must_use]
    pub fn live_transactions(&self) -> Vec<TransactionState> {
        self.registry.list_all()
    }

    #[must_use]
    pub fn transaction(&self, id: &TransactionId) -> Option<&TransactionState> {
        self.registry.get(id)
    }

    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        self.registry
            .iter()
            .fold(StatusCounts::default(), |mut counts, tx| {
                match tx.status {
                    TransactionStatus::Active => counts.active += 1,
                    TransactionStatus::Committed => counts.committed += 1,
                    TransactionStatus::Rollbacked => counts.rollbacked += 1,
                }
                counts
            })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty() && self.registry.is_empty()
    }
}
