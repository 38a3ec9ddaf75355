use alloc::string::{String, ToString};
use core::fmt::{Display, Formatter, Result};
use core::str::FromStr;

use serde_json::Value;

/// Backend-assigned transaction identifier.
///
/// Identifiers are opaque; the backend guarantees that two distinct
/// transactions never share one during their lifetime.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(&self.0)
    }
}

/// Backend wall-clock time of an event, in Unix milliseconds.
///
/// Timestamps are informational only: events are ordered by receipt, and
/// nothing assumes these values increase.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

/// One of the four standard SQL isolation levels.
///
/// Parsing is lenient about separators and case (`READ-COMMITTED`,
/// `READ_COMMITTED`, `read committed`); rendering uses the hyphenated
/// upper-case form the backend reports, and [`IsolationLevel::as_sql`]
/// gives the keyword form a `SET TRANSACTION` statement expects.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const ALL: [Self; 4] = [
        Self::ReadUncommitted,
        Self::ReadCommitted,
        Self::RepeatableRead,
        Self::Serializable,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ-UNCOMMITTED",
            Self::ReadCommitted => "READ-COMMITTED",
            Self::RepeatableRead => "REPEATABLE-READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut Formatter) -> Result {
        f.write_str(self.as_str())
    }
}

/// Rejected isolation level text.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("unknown isolation level `{_0}`")]
pub struct UnknownIsolationLevel(pub String);

impl FromStr for IsolationLevel {
    type Err = UnknownIsolationLevel;

    fn from_str(text: &str) -> core::result::Result<Self, Self::Err> {
        let normalized: String = text
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| UnknownIsolationLevel(text.to_string()))
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = UnknownIsolationLevel;

    fn try_from(text: String) -> core::result::Result<Self, Self::Error> {
        text.parse()
    }
}

impl From<IsolationLevel> for String {
    fn from(level: IsolationLevel) -> Self {
        level.as_str().to_string()
    }
}

/// Kind of lock a statement acquired, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LockType {
    Shared,
    Exclusive,
    Gap,
    Other(String),
}

impl From<String> for LockType {
    fn from(text: String) -> Self {
        match text.as_str() {
            "shared" => Self::Shared,
            "exclusive" => Self::Exclusive,
            "gap" => Self::Gap,
            _ => Self::Other(text),
        }
    }
}

impl From<LockType> for String {
    fn from(lock_type: LockType) -> Self {
        match lock_type {
            LockType::Shared => "shared".to_string(),
            LockType::Exclusive => "exclusive".to_string(),
            LockType::Gap => "gap".to_string(),
            LockType::Other(text) => text,
        }
    }
}

/// Lock held or requested by the statement that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockInfo {
    pub lock_type: LockType,
    pub table: String,
    /// `None` for table-level locks.
    pub row_id: Option<u64>,
}

/// Kind-specific payload of a [`TransactionEvent`].
///
/// Fields that do not apply to a kind simply do not exist on its variant.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Started {
        // Mirrored verbatim; the backend does not normalize spellings.
        isolation_level: Option<String>,
    },
    QueryExecuted {
        query: String,
        /// `None` when the backend sent no result at all. An explicit JSON
        /// `null` is kept as `Some(Value::Null)`.
        result: Option<Value>,
        /// Backend's own verdict on whether the statement wrote data.
        mutates: Option<bool>,
    },
    Committed,
    Rollbacked,
}

impl EventKind {
    /// Wire name of this kind (the `type` field).
    #[must_use]
    pub const fn wire_name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "transaction_started",
            Self::QueryExecuted { .. } => "query_executed",
            Self::Committed => "transaction_committed",
            Self::Rollbacked => "transaction_rollbacked",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Rollbacked)
    }
}

/// One immutable lifecycle record of a backend transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionEvent {
    pub id: TransactionId,
    pub kind: EventKind,
    pub timestamp: Timestamp,
    pub lock_info: Option<LockInfo>,
}

impl TransactionEvent {
    #[must_use]
    pub fn started(id: impl Into<TransactionId>, isolation_level: &str, timestamp: i64) -> Self {
        Self::new(
            id,
            EventKind::Started {
                isolation_level: Some(isolation_level.to_string()),
            },
            timestamp,
        )
    }

    #[must_use]
    pub fn query(id: impl Into<TransactionId>, query: &str, timestamp: i64) -> Self {
        Self::new(
            id,
            EventKind::QueryExecuted {
                query: query.to_string(),
                result: None,
                mutates: None,
            },
            timestamp,
        )
    }

    #[must_use]
    pub fn committed(id: impl Into<TransactionId>, timestamp: i64) -> Self {
        Self::new(id, EventKind::Committed, timestamp)
    }

    #[must_use]
    pub fn rollbacked(id: impl Into<TransactionId>, timestamp: i64) -> Self {
        Self::new(id, EventKind::Rollbacked, timestamp)
    }

    fn new(id: impl Into<TransactionId>, kind: EventKind, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            timestamp: Timestamp(timestamp),
            lock_info: None,
        }
    }

    #[must_use]
    pub fn with_result(mut self, value: Value) -> Self {
        if let EventKind::QueryExecuted { result, .. } = &mut self.kind {
            *result = Some(value);
        }
        self
    }

    #[must_use]
    pub fn with_lock(mut self, lock_info: LockInfo) -> Self {
        self.lock_info = Some(lock_info);
        self
    }

    /// The SQL text, for `query_executed` events.
    #[must_use]
    pub fn query_text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::QueryExecuted { query, .. } => Some(query),
            _ => None,
        }
    }
}
