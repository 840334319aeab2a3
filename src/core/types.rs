use serde_json::{Map, Value as JsonValue};
use super::{DbError, Result};

/// Integer tag identifying the shape of a persisted store.
pub type SchemaVersion = u32;

/// A stored document: a JSON object.
pub type Record = Map<String, JsonValue>;

/// Converts an arbitrary JSON value into a record, rejecting non-objects.
pub fn record_from_json(value: JsonValue) -> Result<Record> {
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(DbError::InvalidRecord(format!(
            "Expected a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Options for a single read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Skip the middleware chain and return the stored representation.
    pub bypass_middleware: bool,
}

impl ReadOptions {
    pub fn raw() -> Self {
        Self {
            bypass_middleware: true,
        }
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Skip the middleware chain and store the record as given.
    pub bypass_middleware: bool,
}

impl WriteOptions {
    pub fn raw() -> Self {
        Self {
            bypass_middleware: true,
        }
    }
}
