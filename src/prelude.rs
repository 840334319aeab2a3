//! Common imports for applications using the store.
//!
//! `store` covers opening and using the wallet store. `migration` adds what is
//! needed to declare a custom schema history and steps.

pub mod store {
    pub use crate::{
        DbError, ReadOptions, Record, RecordKey, Result, StoreConfig, StoreConnection, WalletDb,
        WriteOptions, record_from_json,
    };
}

pub mod migration {
    pub use crate::{
        InitReport, MigrationRunner, MigrationStep, MigrationTable, SchemaHistory, StorageEngine,
        UpgradeTransaction,
    };
}
