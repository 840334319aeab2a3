// ============================================================================
// WalletDB Library
// ============================================================================
//
// Local document store for a wallet application. A store is a set of named
// record-sets at an integer schema version; opening it runs the migration
// steps needed to reach the current version.

pub mod connection;
pub mod core;
pub mod facade;
pub mod middleware;
pub mod migration;
pub mod prelude;
pub mod schema;
pub mod storage;

pub use connection::{StoreConfig, StoreConnection};
pub use crate::core::{DbError, ReadOptions, Record, RecordKey, Result, SchemaVersion, WriteOptions, record_from_json};
pub use facade::WalletDb;
pub use middleware::{EncryptedFields, FieldEncryption, MiddlewareChain, RecordMiddleware, default_encrypted_fields};
pub use migration::{
    InitReport, MigrationRunner, MigrationStatus, MigrationStep, MigrationTable, ReadyStore, UpgradeTransaction,
    wallet_migrations,
};
pub use schema::{CURRENT_SCHEMA_VERSION, SchemaHistory, StoreSchema, WALLET_TABLES, wallet_schema_history};
pub use storage::{DurabilityMode, FileStorage, InMemoryStorage, StorageEngine, StoreImage, TableSchema};
