pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{ReadOptions, Record, SchemaVersion, WriteOptions, json_type_name, record_from_json};
pub use value::{RecordKey, index_value};
