//! Per-version table declarations.
//!
//! A version inherits every declaration of the versions before it. A version
//! may add a table, re-declare its indexes, or delete it (`None`).

use crate::core::{DbError, Result, SchemaVersion};
use crate::storage::TableSchema;
use std::collections::BTreeMap;

mod wallet;

pub use wallet::{CURRENT_SCHEMA_VERSION, WALLET_TABLES, wallet_schema_history};

/// The table layout in force at one version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSchema {
    tables: BTreeMap<String, TableSchema>,
}

impl StoreSchema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Declarations keyed by the version that introduces them.
#[derive(Debug, Clone, Default)]
pub struct SchemaHistory {
    versions: BTreeMap<SchemaVersion, Vec<(String, Option<String>)>>,
}

impl SchemaHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the table changes introduced at `version`.
    pub fn version<'a, I>(mut self, version: SchemaVersion, tables: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let entry = self.versions.entry(version).or_default();
        for (name, declaration) in tables {
            entry.push((name.to_string(), declaration.map(str::to_string)));
        }
        self
    }

    pub fn latest_version(&self) -> Option<SchemaVersion> {
        self.versions.keys().next_back().copied()
    }

    /// Folds every declaration up to and including `version`.
    pub fn schema_at(&self, version: SchemaVersion) -> Result<StoreSchema> {
        let mut schema = StoreSchema::default();
        for (_, changes) in self.versions.range(..=version) {
            for (name, declaration) in changes {
                match declaration {
                    Some(declaration) => {
                        let table = TableSchema::parse(name, declaration)?;
                        schema.tables.insert(name.clone(), table);
                    }
                    None => {
                        schema.tables.remove(name);
                    }
                }
            }
        }
        Ok(schema)
    }

    /// Checks that every declaration parses and that nothing is declared past `target`.
    pub fn validate(&self, target: SchemaVersion) -> Result<()> {
        if let Some(latest) = self.latest_version()
            && latest > target
        {
            return Err(DbError::SchemaError(format!(
                "Schema declares version {} beyond target version {}",
                latest, target
            )));
        }
        for version in self.versions.keys() {
            self.schema_at(*version)?;
        }
        Ok(())
    }
}
