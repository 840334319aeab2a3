use std::fmt;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use crate::core::{DbError, Result};

/// Primary key of a stored record.
///
/// Integers sort before text, mirroring the key ordering of browser-side
/// object stores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    Integer(i64),
    Text(String),
}

impl RecordKey {
    /// Reads a key out of a JSON field value.
    ///
    /// Only integral numbers and strings are valid keys.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(Self::Integer).ok_or_else(|| {
                DbError::InvalidRecord(format!("Key {} is not an integer", n))
            }),
            JsonValue::String(s) => Ok(Self::Text(s.clone())),
            other => Err(DbError::InvalidRecord(format!(
                "Value {} cannot be used as a record key",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Integer(i) => JsonValue::from(*i),
            Self::Text(s) => JsonValue::from(s.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Text(_) => None,
        }
    }
}

impl From<i64> for RecordKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// Canonical form of an indexed field value.
///
/// Scalars are rendered as compact JSON so `1` and `"1"` stay distinct.
/// Missing and null fields are not indexed.
pub fn index_value(value: Option<&JsonValue>) -> Option<String> {
    match value {
        None | Some(JsonValue::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}
