//! Keyed store of per-transaction state.
//!
//! The registry only ever learns about a transaction through its `started`
//! event. Everything else is routed to an existing entry or ignored:
//!
//! | current status          | incoming kind      | result                          |
//! |-------------------------|--------------------|---------------------------------|
//! | (none)                  | started            | [`Upsert::Created`]             |
//! | (none)                  | anything else      | [`Upsert::UnknownTransaction`]  |
//! | any                     | started            | [`Upsert::DuplicateStart`]      |
//! | active                  | query_executed     | [`Upsert::Appended`]            |
//! | active                  | committed/rollback | [`Upsert::Advanced`]            |
//! | committed/rollbacked    | anything else      | [`Upsert::Frozen`]              |
//!
//! Stored entries are never mutated: every applied event replaces the entry
//! with a freshly built [`TransactionState`], so clones of the registry taken
//! earlier are unaffected.

pub mod state;

use alloc::sync::Arc;
use alloc::vec::Vec;

use hashbrown::HashMap;

pub use self::state::{TransactionState, TransactionStatus};
use crate::event::types::{EventKind, TransactionEvent, TransactionId};
use crate::log::ChunkedLog;

/// What [`TransactionRegistry::upsert`] did with an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was founded by a `started` event.
    Created,
    /// The event was appended and the status changed.
    Advanced {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// The event was appended to an active transaction; status unchanged.
    Appended,
    /// The transaction is already terminal. The event was appended to its
    /// logs, the status stays as it is.
    Frozen(TransactionStatus),
    /// A second `started` for a known id. The first one wins; nothing changed.
    DuplicateStart,
    /// No `started` has been seen for this id; nothing changed.
    UnknownTransaction,
}

impl Upsert {
    /// Whether the registry changed as a result.
    #[must_use]
    pub const fn changed_registry(self) -> bool {
        !matches!(self, Self::DuplicateStart | Self::UnknownTransaction)
    }
}

/// Per-transaction state keyed by id, iterated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRegistry {
    entries: HashMap<TransactionId, Arc<TransactionState>>,
    order: ChunkedLog<TransactionId>,
}

impl TransactionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event. Never fails: unknown ids and duplicate starts are
    /// reported through the returned [`Upsert`] and otherwise ignored.
    pub fn upsert(&mut self, event: impl Into<Arc<TransactionEvent>>) -> Upsert {
        let event = event.into();

        let Some(current) = self.entries.get(&event.id) else {
            return match TransactionState::open(&event) {
                Some(state) => {
                    tracing::trace!(id = %event.id, "transaction created");
                    self.order.push(event.id.clone());
                    self.entries.insert(event.id.clone(), Arc::new(state));
                    Upsert::Created
                }
                None => {
                    tracing::debug!(
                        id = %event.id,
                        kind = event.kind.wire_name(),
                        "event for unknown transaction ignored"
                    );
                    Upsert::UnknownTransaction
                }
            };
        };

        if matches!(event.kind, EventKind::Started { .. }) {
            tracing::debug!(id = %event.id, "duplicate start ignored");
            return Upsert::DuplicateStart;
        }

        let from = current.status;
        let next = current.advanced(&event);
        let to = next.status;
        self.entries.insert(event.id.clone(), Arc::new(next));

        if from.is_terminal() {
            tracing::debug!(id = %event.id, status = %from, "event on finished transaction");
            Upsert::Frozen(from)
        } else if from == to {
            Upsert::Appended
        } else {
            tracing::trace!(id = %event.id, %from, %to, "transaction status changed");
            Upsert::Advanced { from, to }
        }
    }

    #[must_use]
    pub fn get(&self, id: &TransactionId) -> Option<&TransactionState> {
        self.entries.get(id).map(AsRef::as_ref)
    }

    /// All transactions in the order their ids were first seen.
    pub fn iter(&self) -> impl Iterator<Item = &TransactionState> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(AsRef::as_ref)
    }

    /// Owned snapshot of every transaction, first-seen order.
    #[must_use]
    pub fn list_all(&self) -> Vec<TransactionState> {
        self.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> TransactionId {
        TransactionId::from(text)
    }

    #[test]
    fn test_upsert_outcomes() {
        let mut registry = TransactionRegistry::new();

        assert_eq!(
            registry.upsert(TransactionEvent::committed("tx1", 0)),
            Upsert::UnknownTransaction
        );
        assert!(registry.is_empty());

        assert_eq!(
            registry.upsert(TransactionEvent::started("tx1", "READ-COMMITTED", 1)),
            Upsert::Created
        );
        assert_eq!(
            registry.upsert(TransactionEvent::query("tx1", "SELECT 1", 2)),
            Upsert::Appended
        );
        assert_eq!(
            registry.upsert(TransactionEvent::started("tx1", "SERIALIZABLE", 3)),
            Upsert::DuplicateStart
        );
        assert_eq!(
            registry.upsert(TransactionEvent::rollbacked("tx1", 4)),
            Upsert::Advanced {
                from: TransactionStatus::Active,
                to: TransactionStatus::Rollbacked
            }
        );
        assert_eq!(
            registry.upsert(TransactionEvent::committed("tx1", 5)),
            Upsert::Frozen(TransactionStatus::Rollbacked)
        );

        let state = registry.get(&id("tx1")).unwrap();
        assert_eq!(state.status, TransactionStatus::Rollbacked);
        assert_eq!(state.isolation_level.as_deref(), Some("READ-COMMITTED"));
        // started, query, rollback, late commit; the duplicate start is not kept
        assert_eq!(state.logs.len(), 4);
    }

    #[test]
    fn test_list_all_keeps_first_seen_order() {
        let mut registry = TransactionRegistry::new();
        registry.upsert(TransactionEvent::started("b", "SERIALIZABLE", 1));
        registry.upsert(TransactionEvent::started("a", "SERIALIZABLE", 2));
        registry.upsert(TransactionEvent::committed("b", 3));
        registry.upsert(TransactionEvent::started("c", "SERIALIZABLE", 4));

        let ids: Vec<_> = registry.list_all().into_iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![id("b"), id("a"), id("c")]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_earlier_clone_is_not_affected() {
        let mut registry = TransactionRegistry::new();
        registry.upsert(TransactionEvent::started("tx1", "REPEATABLE-READ", 1));
        let before = registry.clone();

        registry.upsert(TransactionEvent::committed("tx1", 2));

        assert_eq!(
            before.get(&id("tx1")).unwrap().status,
            TransactionStatus::Active
        );
        assert_eq!(before.get(&id("tx1")).unwrap().logs.len(), 1);
        assert_eq!(
            registry.get(&id("tx1")).unwrap().status,
            TransactionStatus::Committed
        );
    }

    #[test]
    fn test_clear() {
        let mut registry = TransactionRegistry::new();
        registry.upsert(TransactionEvent::started("tx1", "REPEATABLE-READ", 1));
        registry.clear();
        assert!(registry.list_all().is_empty());
        assert!(registry.get(&id("tx1")).is_none());

        // ids can be reused after a clear
        assert_eq!(
            registry.upsert(TransactionEvent::started("tx1", "REPEATABLE-READ", 2)),
            Upsert::Created
        );
    }
}
