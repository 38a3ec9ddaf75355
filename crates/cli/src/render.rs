use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Local};
use txlens_client::{ConnectionState, MonitorView, User};
use txlens_core::event::{EventKind, LockInfo, Timestamp, TransactionEvent};
use txlens_core::{StatusCounts, TransactionState};

/// Wall-clock time of an event in the local timezone.
pub fn clock(timestamp: Timestamp) -> String {
    let millis = timestamp.as_millis();
    DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |time| time.with_timezone(&Local).format("%H:%M:%S%.3f").to_string(),
    )
}

fn lock(lock_info: &LockInfo) -> String {
    let lock_type = String::from(lock_info.lock_type.clone());
    match lock_info.row_id {
        Some(row) => format!("{lock_type} lock on {}#{row}", lock_info.table),
        None => format!("{lock_type} lock on {}", lock_info.table),
    }
}

pub fn event_line(event: &TransactionEvent) -> String {
    let mut line = format!("{}  {:<8}  ", clock(event.timestamp), event.id.as_str());
    match &event.kind {
        EventKind::Started { isolation_level } => {
            let _ = write!(
                line,
                "START ({})",
                isolation_level.as_deref().unwrap_or("level unknown")
            );
        }
        EventKind::QueryExecuted { query, result, .. } => {
            let _ = write!(line, "QUERY {query}");
            if let Some(result) = result {
                let _ = write!(line, "  => {result}");
            }
        }
        EventKind::Committed => line.push_str("COMMIT"),
        EventKind::Rollbacked => line.push_str("ROLLBACK"),
    }
    if let Some(lock_info) = &event.lock_info {
        let _ = write!(line, "  [{}]", lock(lock_info));
    }
    line
}

pub fn transaction_line(tx: &TransactionState) -> String {
    format!(
        "{:<8}  {:<10}  {:<16}  {} events",
        tx.id.as_str(),
        tx.status.as_str(),
        tx.isolation_level.as_deref().unwrap_or("-"),
        tx.logs.len()
    )
}

pub fn counts_line(counts: StatusCounts) -> String {
    format!(
        "{} active, {} committed, {} rollbacked",
        counts.active, counts.committed, counts.rollbacked
    )
}

pub fn users_table(users: &[User]) -> String {
    if users.is_empty() {
        return "no users".to_string();
    }
    users.iter().fold(String::new(), |mut table, user| {
        let _ = writeln!(
            table,
            "{:>4}  {:<16}  {:>12.2}",
            user.id, user.name, user.balance
        );
        table
    })
}

/// Turns successive monitor views into the lines not printed yet.
#[derive(Default)]
pub struct Feed {
    connection: Option<ConnectionState>,
    last_event: Option<Arc<TransactionEvent>>,
    printed: usize,
    decode_failures: u64,
}

impl Feed {
    pub fn update(&mut self, view: &MonitorView) -> Vec<String> {
        let mut lines = Vec::new();
        if self.connection.as_ref() != Some(&view.connection) {
            lines.push(format!("-- stream {}", view.connection));
            self.connection = Some(view.connection.clone());
        }

        let log = view.snapshot.full_log();
        let continues = match &self.last_event {
            None => true,
            Some(last) => log
                .get(self.printed - 1)
                .is_some_and(|event| Arc::ptr_eq(event, last)),
        };
        if !continues {
            lines.push("-- cleared".to_string());
            self.printed = 0;
            self.last_event = None;
        }
        for event in log.iter_from(self.printed) {
            lines.push(event_line(event));
            if event.kind.is_terminal() {
                if let Some(tx) = view.snapshot.transaction(&event.id) {
                    lines.push(format!("   {}", transaction_line(tx)));
                }
            }
        }
        if let Some(last) = log.last() {
            self.last_event = Some(Arc::clone(last));
        }
        self.printed = log.len();

        if view.diagnostics.decode_failures > self.decode_failures {
            self.decode_failures = view.diagnostics.decode_failures;
            if let Some(err) = &view.diagnostics.last_error {
                lines.push(format!("-- dropped message: {err}"));
            }
        }
        lines
    }
}
