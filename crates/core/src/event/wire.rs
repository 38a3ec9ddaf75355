//! JSON wire format of transaction events.
//!
//! Each message is one JSON object:
//!
//! ```text
//! { "id": "tx1", "type": "query_executed", "query": "UPDATE ...",
//!   "result": {...}, "timestamp": 1700000000000,
//!   "lock_info": { "type": "exclusive", "table": "users", "row_id": 1 } }
//! ```
//!
//! `type` is one of `transaction_started`, `query_executed`,
//! `transaction_committed`, `transaction_rollbacked`. Optional keys that do
//! not apply to the given `type` are ignored.

use alloc::string::String;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::error::DecodeError;
use super::types::{EventKind, LockInfo, Timestamp, TransactionEvent, TransactionId};

/// Serde mirror of a wire message, before kind-specific validation.
#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WireMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[cfg_attr(feature = "schemars", schemars(with = "Option<Value>"))]
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation_level: Option<String>,
    #[cfg_attr(feature = "schemars", schemars(with = "i64"))]
    #[serde(deserialize_with = "millis")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_info: Option<WireLockInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutates: Option<bool>,
}

#[cfg_attr(feature = "schemars", derive(::schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WireLockInfo {
    #[serde(rename = "type")]
    pub lock_type: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<u64>,
}

// A key that is present always yields `Some`, even for `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// Browsers and some backends send fractional milliseconds.
#[allow(clippy::cast_possible_truncation)]
fn millis<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Integer(i64),
        Float(f64),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Integer(ms) => Ok(ms),
        Millis::Float(ms) if ms.is_finite() => Ok(ms as i64),
        Millis::Float(_) => Err(serde::de::Error::custom("timestamp is not finite")),
    }
}

impl From<WireLockInfo> for LockInfo {
    fn from(lock: WireLockInfo) -> Self {
        Self {
            lock_type: lock.lock_type.into(),
            table: lock.table,
            row_id: lock.row_id,
        }
    }
}

impl From<&LockInfo> for WireLockInfo {
    fn from(lock: &LockInfo) -> Self {
        Self {
            lock_type: lock.lock_type.clone().into(),
            table: lock.table.clone(),
            row_id: lock.row_id,
        }
    }
}

impl TryFrom<WireMessage> for TransactionEvent {
    type Error = DecodeError;

    fn try_from(message: WireMessage) -> Result<Self, Self::Error> {
        let kind = match message.kind.as_str() {
            "transaction_started" => EventKind::Started {
                isolation_level: message.isolation_level,
            },
            "query_executed" => EventKind::QueryExecuted {
                query: message.query.ok_or(DecodeError::MissingField {
                    kind: "query_executed",
                    field: "query",
                })?,
                result: message.result,
                mutates: message.mutates,
            },
            "transaction_committed" => EventKind::Committed,
            "transaction_rollbacked" => EventKind::Rollbacked,
            _ => return Err(DecodeError::UnknownKind(message.kind)),
        };

        Ok(Self {
            id: TransactionId(message.id),
            kind,
            timestamp: Timestamp(message.timestamp),
            lock_info: message.lock_info.map(LockInfo::from),
        })
    }
}

impl From<&TransactionEvent> for WireMessage {
    fn from(event: &TransactionEvent) -> Self {
        let mut message = Self {
            id: event.id.0.clone(),
            kind: event.kind.wire_name().into(),
            query: None,
            result: None,
            isolation_level: None,
            timestamp: event.timestamp.as_millis(),
            lock_info: event.lock_info.as_ref().map(WireLockInfo::from),
            mutates: None,
        };
        match &event.kind {
            EventKind::Started { isolation_level } => {
                message.isolation_level.clone_from(isolation_level);
            }
            EventKind::QueryExecuted {
                query,
                result,
                mutates,
            } => {
                message.query = Some(query.clone());
                message.result.clone_from(result);
                message.mutates = *mutates;
            }
            EventKind::Committed | EventKind::Rollbacked => {}
        }
        message
    }
}

impl serde::Serialize for TransactionEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&WireMessage::from(self), serializer)
    }
}

/// Decode one raw text message into a [`TransactionEvent`].
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the text is not a JSON object of the
/// wire shape, [`DecodeError::UnknownKind`] for an unrecognized `type`, and
/// [`DecodeError::MissingField`] for a `query_executed` message without a
/// `query`.
pub fn decode(text: &str) -> Result<TransactionEvent, DecodeError> {
    let message: WireMessage = serde_json::from_str(text)?;
    TransactionEvent::try_from(message)
}

/// Encode an event back into its wire representation.
///
/// # Errors
///
/// Fails only if a `result` payload cannot be represented as JSON text.
pub fn encode(event: &TransactionEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireMessage::from(event))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::event::types::LockType;

    #[test]
    fn test_decode_started() {
        let event = decode(
            r#"{"id":"T1","type":"transaction_started","isolation_level":"READ-COMMITTED","timestamp":1}"#,
        )
        .unwrap();
        assert_eq!(event.id, TransactionId::from("T1"));
        assert_eq!(event.timestamp, Timestamp(1));
        assert_eq!(
            event.kind,
            EventKind::Started {
                isolation_level: Some("READ-COMMITTED".to_string())
            }
        );
        assert_eq!(event.lock_info, None);
    }

    #[test]
    fn test_decode_query_with_result_and_lock() {
        let event = decode(
            r#"{"id":"tx1","type":"query_executed","query":"UPDATE users SET balance = ? WHERE id = ?",
                "result":{"new_balance":1500},"timestamp":1700000000123,
                "lock_info":{"type":"exclusive","table":"users","row_id":1}}"#,
        )
        .unwrap();
        assert_eq!(
            event.kind,
            EventKind::QueryExecuted {
                query: "UPDATE users SET balance = ? WHERE id = ?".to_string(),
                result: Some(json!({"new_balance": 1500})),
                mutates: None,
            }
        );
        assert_eq!(
            event.lock_info,
            Some(LockInfo {
                lock_type: LockType::Exclusive,
                table: "users".to_string(),
                row_id: Some(1),
            })
        );
    }

    #[test]
    fn test_absent_result_differs_from_null_and_empty() {
        let absent = decode(r#"{"id":"a","type":"query_executed","query":"SELECT 1","timestamp":1}"#)
            .unwrap();
        let null = decode(
            r#"{"id":"a","type":"query_executed","query":"SELECT 1","result":null,"timestamp":1}"#,
        )
        .unwrap();
        let empty = decode(
            r#"{"id":"a","type":"query_executed","query":"SELECT 1","result":[],"timestamp":1}"#,
        )
        .unwrap();

        let result = |event: &TransactionEvent| match &event.kind {
            EventKind::QueryExecuted { result, .. } => result.clone(),
            _ => panic!("not a query event"),
        };
        assert_eq!(result(&absent), None);
        assert_eq!(result(&null), Some(Value::Null));
        assert_eq!(result(&empty), Some(json!([])));
    }

    #[test]
    fn test_inapplicable_fields_are_dropped() {
        let event = decode(
            r#"{"id":"a","type":"transaction_committed","query":"COMMIT","isolation_level":"SERIALIZABLE","timestamp":3}"#,
        )
        .unwrap();
        assert_eq!(event.kind, EventKind::Committed);
    }

    #[test]
    fn test_started_without_isolation_level() {
        let event = decode(r#"{"id":"a","type":"transaction_started","timestamp":3}"#).unwrap();
        assert_eq!(
            event.kind,
            EventKind::Started {
                isolation_level: None
            }
        );
    }

    #[test]
    fn test_fractional_timestamp() {
        let event =
            decode(r#"{"id":"a","type":"transaction_rollbacked","timestamp":12.9}"#).unwrap();
        assert_eq!(event.timestamp, Timestamp(12));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            decode(r#"{"type":"transaction_committed","timestamp":1}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"id":"a","type":"transaction_paused","timestamp":1}"#),
            Err(DecodeError::UnknownKind(kind)) if kind == "transaction_paused"
        ));
        assert!(matches!(
            decode(r#"{"id":"a","type":"query_executed","timestamp":1}"#),
            Err(DecodeError::MissingField {
                kind: "query_executed",
                field: "query"
            })
        ));
    }

    #[test]
    fn test_encode_keeps_only_applicable_keys() {
        let text = encode(&TransactionEvent::committed("tx2", 42)).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": "tx2", "type": "transaction_committed", "timestamp": 42})
        );

        let text = encode(&TransactionEvent::query("tx2", "SELECT 1", 43).with_result(Value::Null))
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": "tx2", "type": "query_executed", "query": "SELECT 1", "result": null, "timestamp": 43})
        );
        assert_eq!(decode(&text).unwrap().query_text(), Some("SELECT 1"));
    }
}
