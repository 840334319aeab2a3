use super::catalog::DatabaseInfo;
use super::image::StoreImage;
use super::persistence::WalEntry;
use crate::core::{Result, SchemaVersion};
use async_trait::async_trait;

/// Storage engine trait - allows pluggable storage backends
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// List installed databases with their versions
    async fn databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// Installed version of `name`, or `None` if it was never created
    async fn installed_version(&self, name: &str) -> Result<Option<SchemaVersion>>;

    /// Load the last committed image of `name`, including logged writes
    async fn load(&self, name: &str) -> Result<Option<StoreImage>>;

    /// Durably record `image` (data and version) as the committed state.
    ///
    /// Either the whole image becomes visible to later loads or none of it does.
    async fn commit_version(&self, image: &StoreImage) -> Result<()>;

    /// Log a single write made on top of the last committed image
    async fn append(&self, name: &str, entry: &WalEntry) -> Result<()>;

    /// Remove `name` and everything stored for it
    async fn delete_database(&self, name: &str) -> Result<()>;
}
