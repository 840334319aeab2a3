use crate::connection::{StoreConfig, StoreConnection};
use crate::core::Result;
use crate::migration::{InitReport, MigrationRunner, MigrationStatus};
use crate::storage::{FileStorage, InMemoryStorage, StorageEngine};
use std::sync::Arc;

/// The wallet store, opened and migrated to the current schema version.
///
/// ```ignore
/// let db = WalletDb::open(StoreConfig::from_env()?).await?;
/// let wallets = db.connection().all("wallets").await?;
/// ```
pub struct WalletDb {
    engine: Arc<dyn StorageEngine>,
    config: StoreConfig,
    connection: StoreConnection,
    report: InitReport,
}

impl WalletDb {
    /// Opens the store under `config.data_dir`.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(FileStorage::open(&config.data_dir, config.durability)?);
        Self::open_with_engine(engine, config).await
    }

    /// Opens an ephemeral store that lives only as long as the process.
    pub async fn open_in_memory(config: StoreConfig) -> Result<Self> {
        Self::open_with_engine(Arc::new(InMemoryStorage::new()), config).await
    }

    pub async fn open_with_engine(engine: Arc<dyn StorageEngine>, config: StoreConfig) -> Result<Self> {
        let ready = MigrationRunner::for_wallet(engine.clone(), &config)?
            .initialize()
            .await?;
        Ok(Self {
            engine,
            config,
            connection: ready.connection,
            report: ready.report,
        })
    }

    /// Installed and target version without opening the store.
    pub async fn status(engine: Arc<dyn StorageEngine>, config: &StoreConfig) -> Result<MigrationStatus> {
        MigrationRunner::for_wallet(engine, config)?.status().await
    }

    pub fn connection(&self) -> &StoreConnection {
        &self.connection
    }

    pub fn report(&self) -> &InitReport {
        &self.report
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    pub async fn close(self) -> Result<()> {
        self.connection.close().await
    }
}
