//! Folding events into the (registry, flat log) pair.
//!
//! [`Reconciler::reconcile`] is the only way state advances. It takes the
//! current [`Ledger`] by value and hands back the next one, so an event is
//! always applied completely (registry, log and refresh decision) before the
//! caller can observe or apply anything else.

pub mod refresh;

use alloc::sync::Arc;
use alloc::vec::Vec;

pub use self::refresh::{RefreshPolicy, RefreshSignal};
use crate::event::types::TransactionEvent;
use crate::log::EventLog;
use crate::projection::Snapshot;
use crate::registry::{TransactionRegistry, Upsert};

/// The registry together with the flat, receipt-ordered log of every event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    registry: TransactionRegistry,
    log: EventLog,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Empty both the registry and the log.
    ///
    /// Both halves are reset within one exclusive borrow, so no reader can
    /// see one cleared without the other.
    pub fn clear(&mut self) {
        tracing::debug!(
            transactions = self.registry.len(),
            events = self.log.len(),
            "clearing ledger"
        );
        self.registry.clear();
        self.log.clear();
    }

    /// Immutable view for readers. Shares the sealed part of the log, so
    /// the cost is bounded by the registry size plus one log chunk.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.registry.clone(), self.log.clone())
    }
}

/// Outcome of reconciling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub upsert: Upsert,
    /// Set when the event indicates cached backend data is stale.
    pub refresh: Option<RefreshSignal>,
}

/// Applies events to a [`Ledger`] one at a time.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Reconciler {
    pub policy: RefreshPolicy,
}

impl Reconciler {
    #[must_use]
    pub const fn new(policy: RefreshPolicy) -> Self {
        Self { policy }
    }

    /// Fold `event` into `ledger`, returning the next ledger.
    ///
    /// Every event lands in the flat log, whatever the registry makes of it.
    /// Nothing here fails: unknown ids, duplicate starts and late terminal
    /// events are all reported through [`Reconciliation::upsert`].
    #[must_use]
    pub fn reconcile(
        &self,
        mut ledger: Ledger,
        event: TransactionEvent,
    ) -> (Ledger, Reconciliation) {
        let event = Arc::new(event);
        let upsert = ledger.registry.upsert(Arc::clone(&event));
        let refresh = self.policy.signal(&event);
        if let Some(signal) = &refresh {
            tracing::debug!(cause = %signal.cause, "backend data marked stale");
        }
        ledger.log.push(event);

        tracing::trace!(?upsert, log_len = ledger.log.len(), "event reconciled");
        (ledger, Reconciliation { upsert, refresh })
    }

    /// Fold a whole sequence, collecting refresh signals in order.
    #[must_use]
    pub fn replay<I>(&self, ledger: Ledger, events: I) -> (Ledger, Vec<RefreshSignal>)
    where
        I: IntoIterator<Item = TransactionEvent>,
    {
        events
            .into_iter()
            .fold((ledger, Vec::new()), |(ledger, mut signals), event| {
                let (ledger, reconciliation) = self.reconcile(ledger, event);
                signals.extend(reconciliation.refresh);
                (ledger, signals)
            })
    }
}
