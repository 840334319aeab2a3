use super::catalog::{CatalogFile, DatabaseInfo};
use super::engine::StorageEngine;
use super::image::StoreImage;
use super::persistence::{DurabilityMode, PersistenceManager, SNAPSHOT_FILE, SnapshotManager, WalEntry};
use crate::core::{DbError, Result, SchemaVersion};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{Level, event};

/// Engine that stores each database as a snapshot plus WAL under `data_dir`.
///
/// Layout:
/// ```text
/// data_dir/catalog.json
/// data_dir/<name>/store.snapshot
/// data_dir/<name>/store.wal
/// ```
///
/// The snapshot is the commit point of a version change; the catalog is
/// written after it and repaired from the snapshot if the two disagree.
pub struct FileStorage {
    data_dir: PathBuf,
    durability_mode: DurabilityMode,
    catalog: Mutex<CatalogFile>,
    databases: Mutex<HashMap<String, PersistenceManager>>,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .map_err(|e| DbError::IoError(format!("Failed to create data directory {}: {}", data_dir.display(), e)))?;
        Ok(Self {
            catalog: Mutex::new(CatalogFile::new(&data_dir)),
            data_dir,
            durability_mode,
            databases: Mutex::new(HashMap::new()),
        })
    }

    fn database_dir(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name.starts_with('.')
            || !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(DbError::ExecutionError(format!("Invalid database name '{}'", name)));
        }
        Ok(self.data_dir.join(name))
    }

    async fn with_persistence<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut PersistenceManager) -> Result<T>,
    ) -> Result<T> {
        let mut databases = self.databases.lock().await;
        if !databases.contains_key(name) {
            let manager = PersistenceManager::new(self.database_dir(name)?, self.durability_mode)?;
            databases.insert(name.to_string(), manager);
        }
        let manager = databases
            .get_mut(name)
            .ok_or_else(|| DbError::ExecutionError(format!("Database '{}' not available", name)))?;
        f(manager)
    }
}

#[async_trait]
impl StorageEngine for FileStorage {
    async fn databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self.catalog.lock().await.load()?.entries())
    }

    async fn installed_version(&self, name: &str) -> Result<Option<SchemaVersion>> {
        let catalog_file = self.catalog.lock().await;
        let catalog = catalog_file.load()?;
        let listed = catalog.version_of(name);

        let database_dir = self.database_dir(name)?;
        if listed.is_none() && !database_dir.exists() {
            return Ok(None);
        }

        // Read the snapshot directly; opening a PersistenceManager would create the WAL.
        let committed = SnapshotManager::new(database_dir.join(SNAPSHOT_FILE)).version()?;
        match (listed, committed) {
            (listed, Some(committed)) if listed != Some(committed) => {
                log::warn!(
                    "Catalog lists '{}' at {:?} but its snapshot is at version {}; repairing catalog",
                    name, listed, committed
                );
                catalog_file.save(&catalog.with_version(name, committed))?;
                Ok(Some(committed))
            }
            (Some(listed), None) => Err(DbError::ExecutionError(format!(
                "Catalog lists '{}' at version {} but no snapshot exists",
                name, listed
            ))),
            (_, committed) => Ok(committed),
        }
    }

    async fn load(&self, name: &str) -> Result<Option<StoreImage>> {
        self.with_persistence(name, |manager| manager.recover()).await
    }

    async fn commit_version(&self, image: &StoreImage) -> Result<()> {
        let name = image.name();
        self.with_persistence(name, |manager| manager.checkpoint(image)).await?;

        let catalog_file = self.catalog.lock().await;
        let catalog = catalog_file.load()?;
        catalog_file.save(&catalog.with_version(name, image.version()))?;
        event!(Level::DEBUG, database = %name, version = image.version(), "committed store snapshot");
        Ok(())
    }

    async fn append(&self, name: &str, entry: &WalEntry) -> Result<()> {
        self.with_persistence(name, |manager| manager.log(entry)).await
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        let dir = self.database_dir(name)?;
        self.databases.lock().await.remove(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .map_err(|e| DbError::IoError(format!("Failed to remove {}: {}", dir.display(), e)))?;
        }
        let catalog_file = self.catalog.lock().await;
        let catalog = catalog_file.load()?;
        catalog_file.save(&catalog.without_database(name))?;
        event!(Level::INFO, database = %name, "deleted database");
        Ok(())
    }
}
