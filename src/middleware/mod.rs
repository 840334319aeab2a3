//! Interceptors that transform records on their way into and out of storage.

use crate::core::{Record, Result};
use std::sync::Arc;

pub mod encryption;

pub use encryption::{EncryptedFields, FieldEncryption, default_encrypted_fields};

/// A pluggable read/write interceptor attached to a store connection.
pub trait RecordMiddleware: Send + Sync {
    fn name(&self) -> &str;

    /// Transforms a record before it is written to `table`.
    fn before_write(&self, table: &str, record: Record) -> Result<Record>;

    /// Transforms a record read from `table` before it is handed out.
    fn after_read(&self, table: &str, record: Record) -> Result<Record>;
}

/// Ordered middleware stack.
///
/// Writes pass through the middlewares in registration order, reads in
/// reverse, so the outermost middleware sees the caller's representation.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn RecordMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, middleware: Arc<dyn RecordMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn push(&mut self, middleware: Arc<dyn RecordMiddleware>) {
        self.middlewares.push(middleware);
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.middlewares.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn before_write(&self, table: &str, record: Record) -> Result<Record> {
        self.middlewares
            .iter()
            .try_fold(record, |record, m| m.before_write(table, record))
    }

    pub fn after_read(&self, table: &str, record: Record) -> Result<Record> {
        self.middlewares
            .iter()
            .rev()
            .try_fold(record, |record, m| m.after_read(table, record))
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record_from_json;
    use serde_json::{Value as JsonValue, json};

    struct Tag(&'static str);

    impl RecordMiddleware for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn before_write(&self, _table: &str, mut record: Record) -> Result<Record> {
            let trail = record.get("trail").and_then(JsonValue::as_str).unwrap_or("").to_string();
            record.insert("trail".into(), json!(format!("{}>{}", trail, self.0)));
            Ok(record)
        }

        fn after_read(&self, _table: &str, mut record: Record) -> Result<Record> {
            let trail = record.get("trail").and_then(JsonValue::as_str).unwrap_or("").to_string();
            record.insert("trail".into(), json!(format!("{}<{}", trail, self.0)));
            Ok(record)
        }
    }

    #[test]
    fn test_write_order_and_reverse_read_order() {
        let chain = MiddlewareChain::new()
            .with(Arc::new(Tag("a")))
            .with(Arc::new(Tag("b")));
        let written = chain.before_write("t", record_from_json(json!({})).unwrap()).unwrap();
        assert_eq!(written["trail"], json!(">a>b"));
        let read = chain.after_read("t", written).unwrap();
        assert_eq!(read["trail"], json!(">a>b<b<a"));
        assert_eq!(chain.names(), vec!["a", "b"]);
    }
}
