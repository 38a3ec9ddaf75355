use alloc::string::String;

/// Error turning one raw wire message into a [`TransactionEvent`].
///
/// Decode failures are local to a single message: the ingester drops the
/// message, reports the error as a diagnostic and keeps reading.
///
/// [`TransactionEvent`]: super::types::TransactionEvent
#[derive(Debug, derive_more::From, derive_more::Display)]
pub enum DecodeError {
    /// Not JSON, or JSON of the wrong shape (missing `id`, `type` or `timestamp`).
    #[from]
    #[display("malformed wire message: {_0}")]
    Malformed(serde_json::Error),
    /// The `type` field names no known event kind.
    #[display("unknown event type `{_0}`")]
    UnknownKind(String),
    /// A field the event kind cannot do without is absent.
    #[display("`{field}` is required on `{kind}` events")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    /// A binary frame whose payload is not UTF-8 text.
    #[display("binary frame is not valid UTF-8")]
    NotText,
}
