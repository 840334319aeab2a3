use crate::core::{DbError, Result, SchemaVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const CATALOG_FILE: &str = "catalog.json";

/// One installed database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub version: SchemaVersion,
    pub updated_at: DateTime<Utc>,
}

/// Listing of the databases in a storage location with their installed versions.
///
/// Immutable once built; updates return a new catalog (copy-on-write), so a
/// clone is cheap and never observes a half-applied change.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    databases: Arc<BTreeMap<String, DatabaseInfo>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<DatabaseInfo>) -> Self {
        let databases = entries.into_iter().map(|e| (e.name.clone(), e)).collect();
        Self { databases: Arc::new(databases) }
    }

    /// Records `name` at `version` - returns a NEW catalog.
    pub fn with_version(self, name: &str, version: SchemaVersion) -> Self {
        let mut databases = (*self.databases).clone();
        databases.insert(
            name.to_string(),
            DatabaseInfo {
                name: name.to_string(),
                version,
                updated_at: Utc::now(),
            },
        );
        Self { databases: Arc::new(databases) }
    }

    /// Removes `name` - returns a NEW catalog.
    pub fn without_database(self, name: &str) -> Self {
        if !self.databases.contains_key(name) {
            return self;
        }
        let mut databases = (*self.databases).clone();
        databases.remove(name);
        Self { databases: Arc::new(databases) }
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.get(name)
    }

    pub fn version_of(&self, name: &str) -> Option<SchemaVersion> {
        self.get(name).map(|info| info.version)
    }

    pub fn entries(&self) -> Vec<DatabaseInfo> {
        self.databases.values().cloned().collect()
    }
}

/// Reads and atomically rewrites `catalog.json` in a storage directory.
pub struct CatalogFile {
    path: PathBuf,
}

impl CatalogFile {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self { path: data_dir.as_ref().join(CATALOG_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Catalog> {
        if !self.path.exists() {
            return Ok(Catalog::new());
        }
        let data = fs::read(&self.path)
            .map_err(|e| DbError::IoError(format!("Failed to read catalog: {}", e)))?;
        let entries: Vec<DatabaseInfo> = serde_json::from_slice(&data)
            .map_err(|e| DbError::SerializationError(format!("Corrupt catalog {}: {}", self.path.display(), e)))?;
        Ok(Catalog::from_entries(entries))
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| DbError::IoError(format!("Failed to create catalog directory: {}", e)))?;
        let data = serde_json::to_vec_pretty(&catalog.entries())?;
        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&data)
            .map_err(|e| DbError::IoError(format!("Failed to write catalog: {}", e)))?;
        temp.as_file().sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync catalog: {}", e)))?;
        temp.persist(&self.path)
            .map_err(|e| DbError::IoError(format!("Failed to rename catalog: {}", e)))?;
        Ok(())
    }
}
