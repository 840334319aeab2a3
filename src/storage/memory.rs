use super::catalog::{Catalog, DatabaseInfo};
use super::engine::StorageEngine;
use super::image::StoreImage;
use super::persistence::WalEntry;
use crate::core::{DbError, Result, SchemaVersion};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Engine that keeps committed images in process memory.
///
/// Used for ephemeral stores and tests. Keeps the sequence of committed
/// versions per database so callers can observe how an upgrade progressed.
#[derive(Default)]
pub struct InMemoryStorage {
    images: RwLock<HashMap<String, StoreImage>>,
    catalog: RwLock<Catalog>,
    commits: RwLock<Vec<(String, SchemaVersion)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a database as if it had been committed earlier.
    pub async fn install(&self, image: StoreImage) {
        let name = image.name().to_string();
        let version = image.version();
        self.images.write().await.insert(name.clone(), image);
        let mut catalog = self.catalog.write().await;
        *catalog = catalog.clone().with_version(&name, version);
    }

    /// Every `(database, version)` committed so far, in order.
    pub async fn commit_history(&self) -> Vec<(String, SchemaVersion)> {
        self.commits.read().await.clone()
    }

    pub async fn clear_commit_history(&self) {
        self.commits.write().await.clear();
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn databases(&self) -> Result<Vec<DatabaseInfo>> {
        Ok(self.catalog.read().await.entries())
    }

    async fn installed_version(&self, name: &str) -> Result<Option<SchemaVersion>> {
        Ok(self.catalog.read().await.version_of(name))
    }

    async fn load(&self, name: &str) -> Result<Option<StoreImage>> {
        Ok(self.images.read().await.get(name).cloned())
    }

    async fn commit_version(&self, image: &StoreImage) -> Result<()> {
        let name = image.name().to_string();
        self.images.write().await.insert(name.clone(), image.clone());
        {
            let mut catalog = self.catalog.write().await;
            *catalog = catalog.clone().with_version(&name, image.version());
        }
        self.commits.write().await.push((name, image.version()));
        Ok(())
    }

    async fn append(&self, name: &str, entry: &WalEntry) -> Result<()> {
        let mut images = self.images.write().await;
        let image = images.get_mut(name).ok_or_else(|| {
            DbError::ExecutionError(format!("Database '{}' has not been committed", name))
        })?;
        image.replay(entry.clone())
    }

    async fn delete_database(&self, name: &str) -> Result<()> {
        self.images.write().await.remove(name);
        let mut catalog = self.catalog.write().await;
        *catalog = catalog.clone().without_database(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record_from_json;
    use crate::storage::TableSchema;
    use serde_json::json;

    #[tokio::test]
    async fn test_commit_updates_catalog_and_history() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.installed_version("walletdb").await.unwrap(), None);

        let mut image = StoreImage::new("walletdb", 1);
        image.create_table(TableSchema::parse("users", "++id").unwrap()).unwrap();
        storage.commit_version(&image).await.unwrap();
        image.set_version(2);
        storage.commit_version(&image).await.unwrap();

        assert_eq!(storage.installed_version("walletdb").await.unwrap(), Some(2));
        assert_eq!(
            storage.commit_history().await,
            vec![("walletdb".to_string(), 1), ("walletdb".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_append_requires_committed_database() {
        let storage = InMemoryStorage::new();
        let entry = WalEntry::Clear { table: "users".to_string() };
        assert!(storage.append("walletdb", &entry).await.is_err());

        let mut image = StoreImage::new("walletdb", 1);
        image.create_table(TableSchema::parse("users", "++id").unwrap()).unwrap();
        storage.install(image).await;
        storage
            .append(
                "walletdb",
                &WalEntry::Put {
                    table: "users".to_string(),
                    record: record_from_json(json!({"name": "a"})).unwrap(),
                },
            )
            .await
            .unwrap();
        let loaded = storage.load("walletdb").await.unwrap().unwrap();
        assert_eq!(loaded.table("users").unwrap().count(), 1);

        storage.delete_database("walletdb").await.unwrap();
        assert!(storage.databases().await.unwrap().is_empty());
    }
}
