/// DSL macros for building test event streams.
///
/// Produces `Vec<TransactionEvent>`.
///
/// # Syntax
///
/// ```ignore
/// stream![
///     started(T1, "READ-COMMITTED") @ 1,
///     query(T1, "UPDATE users SET balance = 0") @ 2,
///     committed(T1) @ 3,
///     rollbacked(T2) @ 4,
/// ]
/// ```
///
/// - `started(id, level)` → `TransactionEvent::started`
/// - `query(id, sql)`     → `TransactionEvent::query`
/// - `committed(id)`      → `TransactionEvent::committed`
/// - `rollbacked(id)`     → `TransactionEvent::rollbacked`
///
/// Build a single event.
#[macro_export]
macro_rules! ev {
    (started($id:ident, $level:expr) @ $ts:expr) => {
        txlens_core::TransactionEvent::started(stringify!($id), $level, $ts)
    };
    (query($id:ident, $sql:expr) @ $ts:expr) => {
        txlens_core::TransactionEvent::query(stringify!($id), $sql, $ts)
    };
    (committed($id:ident) @ $ts:expr) => {
        txlens_core::TransactionEvent::committed(stringify!($id), $ts)
    };
    (rollbacked($id:ident) @ $ts:expr) => {
        txlens_core::TransactionEvent::rollbacked(stringify!($id), $ts)
    };
}

/// Build a stream of events in receipt order.
#[macro_export]
macro_rules! stream {
    ($($kind:ident($($args:tt)*) @ $ts:expr),* $(,)?) => {
        vec![$($crate::ev!($kind($($args)*) @ $ts)),*]
    };
}
