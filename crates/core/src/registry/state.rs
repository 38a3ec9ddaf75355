use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};

use crate::event::types::{EventKind, TransactionEvent, TransactionId};

/// Lifecycle status of an observed transaction.
///
/// `Active` is the only non-terminal status. Once a transaction reaches
/// `Committed` or `Rollbacked` no later event moves it anywhere else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Active,
    Committed,
    Rollbacked,
}

impl TransactionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Rollbacked)
    }

    /// Status after observing an event of `kind`.
    #[must_use]
    pub const fn next(self, kind: &EventKind) -> Self {
        if self.is_terminal() {
            return self;
        }
        match kind {
            EventKind::Committed => Self::Committed,
            EventKind::Rollbacked => Self::Rollbacked,
            EventKind::Started { .. } | EventKind::QueryExecuted { .. } => Self::Active,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Rollbacked => "rollbacked",
        }
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated view of one transaction, folded from its events.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TransactionState {
    pub id: TransactionId,
    pub status: TransactionStatus,
    /// Captured from the founding `started` event and never changed.
    pub isolation_level: Option<String>,
    /// Every event applied to this transaction, founding event first.
    pub logs: Vec<Arc<TransactionEvent>>,
}

impl TransactionState {
    /// Found a transaction from its `started` event.
    ///
    /// Returns `None` for any other kind of event.
    #[must_use]
    pub fn open(event: &Arc<TransactionEvent>) -> Option<Self> {
        let EventKind::Started { isolation_level } = &event.kind else {
            return None;
        };
        Some(Self {
            id: event.id.clone(),
            status: TransactionStatus::Active,
            isolation_level: isolation_level.clone(),
            logs: alloc::vec![Arc::clone(event)],
        })
    }

    /// A new state with `event` appended and the status moved on.
    ///
    /// `self` is left untouched; readers holding it keep a consistent view.
    #[must_use]
    pub fn advanced(&self, event: &Arc<TransactionEvent>) -> Self {
        let mut logs = Vec::with_capacity(self.logs.len() + 1);
        logs.extend(self.logs.iter().cloned());
        logs.push(Arc::clone(event));
        Self {
            id: self.id.clone(),
            status: self.status.next(&event.kind),
            isolation_level: self.isolation_level.clone(),
            logs,
        }
    }

    #[must_use]
    pub fn last_event(&self) -> Option<&TransactionEvent> {
        self.logs.last().map(AsRef::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::{Active, Committed, Rollbacked};

        let query = EventKind::QueryExecuted {
            query: "SELECT 1".into(),
            result: None,
            mutates: None,
        };
        assert_eq!(Active.next(&query), Active);
        assert_eq!(Active.next(&EventKind::Committed), Committed);
        assert_eq!(Active.next(&EventKind::Rollbacked), Rollbacked);
        assert_eq!(Committed.next(&EventKind::Rollbacked), Committed);
        assert_eq!(Rollbacked.next(&EventKind::Committed), Rollbacked);
        assert_eq!(Committed.next(&query), Committed);
    }

    #[test]
    fn test_open_only_from_started() {
        let started = Arc::new(TransactionEvent::started("tx1", "READ_UNCOMMITTED", 1));
        let state = TransactionState::open(&started).unwrap();
        assert_eq!(state.status, TransactionStatus::Active);
        assert_eq!(state.isolation_level.as_deref(), Some("READ_UNCOMMITTED"));
        assert_eq!(state.logs.len(), 1);

        let query = Arc::new(TransactionEvent::query("tx1", "SELECT 1", 2));
        assert!(TransactionState::open(&query).is_none());
    }

    #[test]
    fn test_advanced_leaves_original_untouched() {
        let started = Arc::new(TransactionEvent::started("tx1", "SERIALIZABLE", 1));
        let state = TransactionState::open(&started).unwrap();
        let commit = Arc::new(TransactionEvent::committed("tx1", 2));
        let next = state.advanced(&commit);

        assert_eq!(state.status, TransactionStatus::Active);
        assert_eq!(state.logs.len(), 1);
        assert_eq!(next.status, TransactionStatus::Committed);
        assert_eq!(next.logs.len(), 2);
        assert_eq!(next.last_event(), Some(commit.as_ref()));
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Rollbacked).unwrap(),
            "\"rollbacked\""
        );
    }
}
