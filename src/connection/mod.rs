pub mod config;

use crate::core::{DbError, ReadOptions, Record, RecordKey, Result, SchemaVersion, WriteOptions};
use crate::middleware::MiddlewareChain;
use crate::storage::{StorageEngine, StoreImage, WalEntry};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{Level, event};

pub use config::StoreConfig;

struct ConnectionState {
    image: StoreImage,
    writes_since_checkpoint: usize,
    closed: bool,
}

/// Handle to an initialized store.
///
/// Every write is logged through the storage engine before it is applied to
/// the in-memory image. After `checkpoint_threshold` logged writes the image
/// is compacted into a snapshot.
pub struct StoreConnection {
    engine: Arc<dyn StorageEngine>,
    middleware: MiddlewareChain,
    checkpoint_threshold: usize,
    state: RwLock<ConnectionState>,
}

impl StoreConnection {
    pub(crate) fn new(
        engine: Arc<dyn StorageEngine>,
        image: StoreImage,
        middleware: MiddlewareChain,
        checkpoint_threshold: usize,
    ) -> Self {
        Self {
            engine,
            middleware,
            checkpoint_threshold: checkpoint_threshold.max(1),
            state: RwLock::new(ConnectionState {
                image,
                writes_since_checkpoint: 0,
                closed: false,
            }),
        }
    }

    pub async fn name(&self) -> String {
        self.state.read().await.image.name().to_string()
    }

    pub async fn version(&self) -> SchemaVersion {
        self.state.read().await.image.version()
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.state.read().await.image.table_names()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub async fn put(&self, table: &str, record: Record) -> Result<RecordKey> {
        self.put_with(table, record, WriteOptions::default()).await
    }

    /// Inserts or replaces a record, returning its key.
    pub async fn put_with(&self, table: &str, record: Record, options: WriteOptions) -> Result<RecordKey> {
        let record = self.encode(table, record, options)?;
        let mut state = self.state.write().await;
        let key = self.put_locked(&mut state, table, record).await?;
        self.maybe_checkpoint(&mut state).await?;
        Ok(key)
    }

    /// Puts every record in order. Stops at the first failure; records
    /// before it stay written.
    pub async fn bulk_put(&self, table: &str, records: Vec<Record>) -> Result<Vec<RecordKey>> {
        let records = records
            .into_iter()
            .map(|record| self.encode(table, record, WriteOptions::default()))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.state.write().await;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(self.put_locked(&mut state, table, record).await?);
        }
        self.maybe_checkpoint(&mut state).await?;
        Ok(keys)
    }

    pub async fn get(&self, table: &str, key: &RecordKey) -> Result<Option<Record>> {
        self.get_with(table, key, ReadOptions::default()).await
    }

    pub async fn get_with(&self, table: &str, key: &RecordKey, options: ReadOptions) -> Result<Option<Record>> {
        let record = {
            let state = self.state.read().await;
            Self::ensure_open(&state)?;
            state.image.table(table)?.get(key).cloned()
        };
        record.map(|r| self.decode(table, r, options)).transpose()
    }

    pub async fn all(&self, table: &str) -> Result<Vec<Record>> {
        self.all_with(table, ReadOptions::default()).await
    }

    /// All records of `table` in key order.
    pub async fn all_with(&self, table: &str, options: ReadOptions) -> Result<Vec<Record>> {
        let records = {
            let state = self.state.read().await;
            Self::ensure_open(&state)?;
            state.image.table(table)?.records()
        };
        self.decode_all(table, records, options)
    }

    /// Records whose indexed `field` equals `value`.
    pub async fn find_by_index(&self, table: &str, field: &str, value: &JsonValue) -> Result<Vec<Record>> {
        let records = {
            let state = self.state.read().await;
            Self::ensure_open(&state)?;
            state.image.table(table)?.find_by_index(field, value)?
        };
        self.decode_all(table, records, ReadOptions::default())
    }

    pub async fn delete(&self, table: &str, key: &RecordKey) -> Result<bool> {
        let mut state = self.state.write().await;
        Self::ensure_open(&state)?;
        if state.image.table(table)?.get(key).is_none() {
            return Ok(false);
        }
        let name = state.image.name().to_string();
        self.engine
            .append(
                &name,
                &WalEntry::Delete {
                    table: table.to_string(),
                    key: key.clone(),
                },
            )
            .await?;
        state.image.table_mut(table)?.delete(key);
        state.writes_since_checkpoint += 1;
        self.maybe_checkpoint(&mut state).await?;
        Ok(true)
    }

    /// Removes every record of `table`, returning how many were removed.
    pub async fn clear(&self, table: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        Self::ensure_open(&state)?;
        let count = state.image.table(table)?.count();
        let name = state.image.name().to_string();
        self.engine
            .append(&name, &WalEntry::Clear { table: table.to_string() })
            .await?;
        state.image.table_mut(table)?.clear();
        state.writes_since_checkpoint += 1;
        self.maybe_checkpoint(&mut state).await?;
        Ok(count)
    }

    pub async fn count(&self, table: &str) -> Result<usize> {
        let state = self.state.read().await;
        Self::ensure_open(&state)?;
        Ok(state.image.table(table)?.count())
    }

    /// Compacts logged writes into a snapshot at the current version.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut state = self.state.write().await;
        Self::ensure_open(&state)?;
        self.checkpoint_locked(&mut state).await
    }

    /// Checkpoints pending writes and rejects further operations.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.closed {
            return Ok(());
        }
        if state.writes_since_checkpoint > 0 {
            self.checkpoint_locked(&mut state).await?;
        }
        state.closed = true;
        Ok(())
    }

    fn ensure_open(state: &ConnectionState) -> Result<()> {
        if state.closed {
            return Err(DbError::ExecutionError("Connection is closed".into()));
        }
        Ok(())
    }

    fn encode(&self, table: &str, record: Record, options: WriteOptions) -> Result<Record> {
        if options.bypass_middleware {
            Ok(record)
        } else {
            self.middleware.before_write(table, record)
        }
    }

    fn decode(&self, table: &str, record: Record, options: ReadOptions) -> Result<Record> {
        if options.bypass_middleware {
            Ok(record)
        } else {
            self.middleware.after_read(table, record)
        }
    }

    fn decode_all(&self, table: &str, records: Vec<Record>, options: ReadOptions) -> Result<Vec<Record>> {
        records
            .into_iter()
            .map(|record| self.decode(table, record, options))
            .collect()
    }

    async fn put_locked(&self, state: &mut ConnectionState, table: &str, record: Record) -> Result<RecordKey> {
        Self::ensure_open(state)?;
        let (key, record) = state.image.table(table)?.prepare_put(record)?;
        let name = state.image.name().to_string();
        self.engine
            .append(
                &name,
                &WalEntry::Put {
                    table: table.to_string(),
                    record: record.clone(),
                },
            )
            .await?;
        state.image.table_mut(table)?.put(record)?;
        state.writes_since_checkpoint += 1;
        Ok(key)
    }

    async fn maybe_checkpoint(&self, state: &mut ConnectionState) -> Result<()> {
        if state.writes_since_checkpoint >= self.checkpoint_threshold {
            self.checkpoint_locked(state).await?;
        }
        Ok(())
    }

    async fn checkpoint_locked(&self, state: &mut ConnectionState) -> Result<()> {
        self.engine.commit_version(&state.image).await?;
        event!(
            Level::DEBUG,
            database = state.image.name(),
            version = state.image.version(),
            writes = state.writes_since_checkpoint,
            "checkpoint written"
        );
        state.writes_since_checkpoint = 0;
        Ok(())
    }
}
