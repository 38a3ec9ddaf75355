pub mod error;
pub mod types;
pub mod wire;

pub use error::DecodeError;
pub use types::{
    EventKind, IsolationLevel, LockInfo, LockType, Timestamp, TransactionEvent, TransactionId,
    UnknownIsolationLevel,
};
pub use wire::{decode, encode, WireMessage};
