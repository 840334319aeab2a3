use super::table::{RecordSet, TableSchema};
use super::persistence::WalEntry;
use crate::core::{DbError, Result, SchemaVersion};
use crate::schema::StoreSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Every record-set of one database, at one schema version.
///
/// The image is the unit that storage engines load and commit; the migration
/// runner threads a single image through the whole upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreImage {
    name: String,
    version: SchemaVersion,
    tables: BTreeMap<String, RecordSet>,
}

impl StoreImage {
    pub fn new(name: impl Into<String>, version: SchemaVersion) -> Self {
        Self {
            name: name.into(),
            version,
            tables: BTreeMap::new(),
        }
    }

    /// Builds an empty image with every table declared by `schema`.
    pub fn create(name: impl Into<String>, version: SchemaVersion, schema: &StoreSchema) -> Result<Self> {
        let mut image = Self::new(name, version);
        image.apply_schema(schema)?;
        Ok(image)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn version(&self) -> SchemaVersion { self.version }

    pub fn set_version(&mut self, version: SchemaVersion) {
        self.version = version;
    }

    pub fn table(&self, name: &str) -> Result<&RecordSet> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut RecordSet> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.tables.values().map(RecordSet::count).sum()
    }

    pub fn create_table(&mut self, schema: TableSchema) -> Result<()> {
        let name = schema.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(DbError::TableExists(name));
        }
        self.tables.insert(name, RecordSet::new(schema));
        Ok(())
    }

    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    /// Brings the table layout in line with `schema`.
    ///
    /// New tables are created empty, changed declarations are re-indexed and
    /// tables the schema no longer declares are dropped with their data.
    /// Records of surviving tables are kept as they are.
    pub fn apply_schema(&mut self, schema: &StoreSchema) -> Result<()> {
        let obsolete: Vec<String> = self
            .tables
            .keys()
            .filter(|name| schema.table(name).is_none())
            .cloned()
            .collect();
        for name in obsolete {
            self.drop_table(&name)?;
        }

        for table_schema in schema.tables() {
            match self.tables.get_mut(table_schema.name()) {
                Some(existing) if existing.schema() == table_schema => {}
                Some(existing) => existing.redefine(table_schema.clone())?,
                None => self.create_table(table_schema.clone())?,
            }
        }
        Ok(())
    }

    /// Re-applies a logged write. Entries for unknown tables are ignored.
    pub fn replay(&mut self, entry: WalEntry) -> Result<()> {
        match entry {
            WalEntry::Put { table, record } => {
                if let Some(set) = self.tables.get_mut(&table) {
                    set.put(record)?;
                }
            }
            WalEntry::Delete { table, key } => {
                if let Some(set) = self.tables.get_mut(&table) {
                    set.delete(&key);
                }
            }
            WalEntry::Clear { table } => {
                if let Some(set) = self.tables.get_mut(&table) {
                    set.clear();
                }
            }
        }
        Ok(())
    }

    /// Must be called after deserialization; secondary indexes are not stored.
    pub fn rebuild_indexes(&mut self) {
        for set in self.tables.values_mut() {
            set.rebuild_indexes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record_from_json;
    use crate::schema::SchemaHistory;
    use serde_json::json;

    fn history() -> SchemaHistory {
        SchemaHistory::new()
            .version(1, [("users", Some("++id, email")), ("errors", Some("++id"))])
            .version(2, [("wallets", Some("++id, &address"))])
            .version(3, [("errors", None), ("users", Some("++id, &email"))])
    }

    #[test]
    fn test_apply_schema_adds_and_drops_tables() {
        let history = history();
        let mut image = StoreImage::create("db", 1, &history.schema_at(1).unwrap()).unwrap();
        assert_eq!(image.table_names(), vec!["errors", "users"]);

        image
            .table_mut("users")
            .unwrap()
            .put(record_from_json(json!({"email": "a@x.io"})).unwrap())
            .unwrap();

        image.apply_schema(&history.schema_at(2).unwrap()).unwrap();
        assert_eq!(image.table_names(), vec!["errors", "users", "wallets"]);

        image.apply_schema(&history.schema_at(3).unwrap()).unwrap();
        assert_eq!(image.table_names(), vec!["users", "wallets"]);
        assert_eq!(image.table("users").unwrap().count(), 1);
        assert!(image.table("users").unwrap().schema().indexes[0].unique);
    }

    #[test]
    fn test_replay_ignores_unknown_tables() {
        let mut image = StoreImage::create("db", 1, &history().schema_at(1).unwrap()).unwrap();
        image
            .replay(WalEntry::Put {
                table: "missing".to_string(),
                record: record_from_json(json!({"id": 1})).unwrap(),
            })
            .unwrap();
        image
            .replay(WalEntry::Put {
                table: "users".to_string(),
                record: record_from_json(json!({"id": 4, "email": "z@x.io"})).unwrap(),
            })
            .unwrap();
        assert_eq!(image.record_count(), 1);
    }
}
