pub mod catalog;
pub mod disk;
pub mod engine;
pub mod image;
pub mod memory;
pub mod persistence;
pub mod table;

pub use catalog::{Catalog, DatabaseInfo};
pub use disk::FileStorage;
pub use engine::StorageEngine;
pub use image::StoreImage;
pub use memory::InMemoryStorage;
pub use persistence::{DurabilityMode, PersistenceManager, WalEntry};
pub use table::{IndexDef, RecordSet, TableSchema};
