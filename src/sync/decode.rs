//! Snapshot decoding.
//!
//! A collection snapshot is a JSON object mapping record keys to record
//! values. Decoding fails closed: a snapshot that is not an object yields an
//! error, and individual entries that do not match the record schema are set
//! aside as [`Rejected`] instead of being guessed at.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::models::Record;
use crate::store::Snapshot;

/// An entry that was dropped while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Expected an object of records, got {0}")]
    NotAMap(&'static str),
}

/// Result of decoding one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    /// In key order.
    pub records: Vec<Record<T>>,
    pub rejected: Vec<Rejected>,
}

pub fn decode_snapshot<T: DeserializeOwned>(snapshot: Snapshot) -> Result<Decoded<T>, DecodeError> {
    let entries = match snapshot {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(entries)) => entries,
        Some(other) => return Err(DecodeError::NotAMap(value_kind(&other))),
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut rejected = Vec::new();
    for (id, value) in entries {
        match serde_json::from_value::<T>(value) {
            Ok(data) => records.push(Record::new(id, data)),
            Err(e) => rejected.push(Rejected {
                id,
                reason: e.to_string(),
            }),
        }
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(Decoded { records, rejected })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
