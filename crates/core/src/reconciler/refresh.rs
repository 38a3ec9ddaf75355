//! Deciding when cached backend data has gone stale.
//!
//! A `query_executed` event that wrote data means any cached snapshot of the
//! backend's tables may no longer match. The reconciler does not refresh
//! anything itself; it emits a [`RefreshSignal`] for the caller to act on.

use crate::event::types::{EventKind, TransactionEvent, TransactionId};

/// Statement keywords that start a data- or schema-changing statement.
const MUTATING_KEYWORDS: [&str; 10] = [
    "INSERT", "UPDATE", "DELETE", "REPLACE", "MERGE", "UPSERT", "TRUNCATE", "ALTER", "DROP",
    "CREATE",
];

/// How a `query_executed` event is judged to have mutated backend data.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshPolicy {
    /// Case-sensitive substring `UPDATE` anywhere in the query text.
    /// Misses `INSERT`, `DELETE` and lower-case statements.
    UpdateKeyword,
    /// Any `;`-separated statement whose leading keyword mutates data.
    #[default]
    MutatingStatements,
    /// Never signal.
    Never,
}

impl RefreshPolicy {
    /// Whether `event` should invalidate cached backend data.
    ///
    /// An explicit `mutates` flag from the backend takes precedence over
    /// text inspection.
    #[must_use]
    pub fn is_mutation(self, event: &TransactionEvent) -> bool {
        let EventKind::QueryExecuted { query, mutates, .. } = &event.kind else {
            return false;
        };
        match (self, mutates) {
            (Self::Never, _) => false,
            (_, Some(flag)) => *flag,
            (Self::UpdateKeyword, None) => query.contains("UPDATE"),
            (Self::MutatingStatements, None) => is_mutating_sql(query),
        }
    }

    #[must_use]
    pub fn signal(self, event: &TransactionEvent) -> Option<RefreshSignal> {
        self.is_mutation(event).then(|| RefreshSignal {
            cause: event.id.clone(),
        })
    }
}

/// Request to refetch cached backend entities.
///
/// Fire-and-forget: whatever the caller does with it has no bearing on the
/// registry or the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSignal {
    /// Transaction whose statement triggered the signal.
    pub cause: TransactionId,
}

fn is_mutating_sql(sql: &str) -> bool {
    sql.split(';').any(|statement| {
        leading_keyword(statement).is_some_and(|keyword| {
            MUTATING_KEYWORDS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(keyword))
        })
    })
}

/// First word of a statement, skipping whitespace, `--` line comments and
/// `/* */` block comments.
fn leading_keyword(statement: &str) -> Option<&str> {
    let mut rest = statement;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}
