use crate::core::{DbError, Record, RecordKey, Result, index_value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A secondary index declared on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub field: String,
    pub unique: bool,
}

/// Shape of a record-set: primary key path plus secondary indexes.
///
/// Declared with the compact store syntax used by browser-side object stores:
/// `"++id, &email, walletId"` means an auto-incremented `id` key, a unique
/// index on `email` and a plain index on `walletId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    key_path: String,
    auto_increment: bool,
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, key_path: impl Into<String>, auto_increment: bool) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            auto_increment,
            indexes: Vec::new(),
        }
    }

    /// Parses a store declaration such as `"++id, &email, walletId"`.
    pub fn parse(name: &str, declaration: &str) -> Result<Self> {
        let mut parts = declaration.split(',').map(str::trim);

        let primary = parts.next().filter(|p| !p.is_empty()).ok_or_else(|| {
            DbError::SchemaError(format!("Table '{}' has an empty declaration", name))
        })?;
        let (key_path, auto_increment) = match primary.strip_prefix("++") {
            Some(rest) => (rest, true),
            None => (primary, false),
        };
        check_field_name(name, key_path)?;

        let mut schema = Self::new(name, key_path, auto_increment);
        for part in parts {
            if part.is_empty() {
                continue;
            }
            let (field, unique) = match part.strip_prefix('&') {
                Some(rest) => (rest, true),
                None => (part, false),
            };
            check_field_name(name, field)?;
            if field == schema.key_path || schema.indexes.iter().any(|i| i.field == field) {
                return Err(DbError::SchemaError(format!(
                    "Table '{}' declares '{}' more than once",
                    name, field
                )));
            }
            schema.indexes.push(IndexDef { field: field.to_string(), unique });
        }

        Ok(schema)
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn key_path(&self) -> &str { &self.key_path }
    pub fn auto_increment(&self) -> bool { self.auto_increment }
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexes.iter().any(|idx| idx.field == field)
    }
}

fn check_field_name(table: &str, field: &str) -> Result<()> {
    if field.is_empty() {
        return Err(DbError::SchemaError(format!("Table '{}' has an empty field name", table)));
    }
    if field.starts_with('[') || field.starts_with('*') || field.contains('+') {
        return Err(DbError::SchemaError(format!(
            "Table '{}': compound and multi-entry indexes are not supported ('{}')",
            table, field
        )));
    }
    if !field.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') {
        return Err(DbError::SchemaError(format!(
            "Table '{}': invalid field name '{}'",
            table, field
        )));
    }
    Ok(())
}

type SecondaryIndex = BTreeMap<String, BTreeSet<RecordKey>>;

/// A named, keyed collection of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    schema: TableSchema,
    rows: BTreeMap<RecordKey, Record>,
    next_key: i64,
    #[serde(skip)]
    indexes: HashMap<String, SecondaryIndex>,
}

impl RecordSet {
    pub fn new(schema: TableSchema) -> Self {
        let mut set = Self {
            schema,
            rows: BTreeMap::new(),
            next_key: 1,
            indexes: HashMap::new(),
        };
        set.rebuild_indexes();
        set
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Inserts or replaces a record, returning its key.
    ///
    /// Auto-increment tables assign the next key when the key field is absent
    /// and write it back into the record.
    pub fn put(&mut self, record: Record) -> Result<RecordKey> {
        let (key, record) = self.prepare_put(record)?;

        if let Some(previous) = self.rows.remove(&key) {
            self.remove_from_indexes(&key, &previous);
        }
        if let Some(id) = key.as_i64()
            && self.schema.auto_increment()
            && id >= self.next_key
        {
            self.next_key = id + 1;
        }
        self.update_indexes(&key, &record);
        self.rows.insert(key.clone(), record);
        Ok(key)
    }

    /// Resolves the key `put` would use and checks constraints, without
    /// modifying the set. The returned record carries its key, so putting it
    /// afterwards stores exactly the same record.
    pub fn prepare_put(&self, mut record: Record) -> Result<(RecordKey, Record)> {
        let key = match record.get(self.schema.key_path()) {
            Some(JsonValue::Null) | None if self.schema.auto_increment() => {
                let key = RecordKey::Integer(self.next_key);
                record.insert(self.schema.key_path().to_string(), key.to_json());
                key
            }
            Some(value) => RecordKey::from_json(value)?,
            None => {
                return Err(DbError::InvalidRecord(format!(
                    "Record for table '{}' is missing key field '{}'",
                    self.schema.name(),
                    self.schema.key_path()
                )));
            }
        };

        self.check_uniqueness(&key, &record)?;
        Ok((key, record))
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.rows.get(key)
    }

    pub fn delete(&mut self, key: &RecordKey) -> bool {
        match self.rows.remove(key) {
            Some(previous) => {
                self.remove_from_indexes(key, &previous);
                true
            }
            None => false,
        }
    }

    /// Removes every record. The auto-increment counter is kept.
    pub fn clear(&mut self) {
        self.rows.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// All records in key order.
    pub fn records(&self) -> Vec<Record> {
        self.rows.values().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&RecordKey, &Record)> {
        self.rows.iter()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Records whose indexed `field` equals `value`, in key order.
    pub fn find_by_index(&self, field: &str, value: &JsonValue) -> Result<Vec<Record>> {
        let index = self.indexes.get(field).ok_or_else(|| {
            DbError::SchemaError(format!(
                "Field '{}' is not indexed in table '{}'",
                field,
                self.schema.name()
            ))
        })?;
        let Some(needle) = index_value(Some(value)) else {
            return Ok(Vec::new());
        };
        Ok(index
            .get(&needle)
            .map(|keys| keys.iter().filter_map(|k| self.rows.get(k).cloned()).collect())
            .unwrap_or_default())
    }

    /// Swaps in a new declaration and re-indexes the existing records.
    ///
    /// Fails if the new unique indexes are violated by existing data, leaving
    /// the set untouched.
    pub fn redefine(&mut self, schema: TableSchema) -> Result<()> {
        if schema.key_path() != self.schema.key_path() {
            return Err(DbError::SchemaError(format!(
                "Cannot change primary key of table '{}' from '{}' to '{}'",
                self.schema.name(),
                self.schema.key_path(),
                schema.key_path()
            )));
        }
        let previous = std::mem::replace(&mut self.schema, schema);
        self.rebuild_indexes();
        if let Err(err) = self.check_all_unique() {
            self.schema = previous;
            self.rebuild_indexes();
            return Err(err);
        }
        Ok(())
    }

    /// Rebuilds secondary indexes from rows; indexes are not serialized.
    pub fn rebuild_indexes(&mut self) {
        self.indexes = self
            .schema
            .indexes
            .iter()
            .map(|def| (def.field.clone(), SecondaryIndex::new()))
            .collect();
        let rows = std::mem::take(&mut self.rows);
        for (key, record) in &rows {
            self.update_indexes(key, record);
        }
        self.rows = rows;
    }

    fn check_all_unique(&self) -> Result<()> {
        for def in self.schema.indexes.iter().filter(|d| d.unique) {
            if let Some(index) = self.indexes.get(&def.field)
                && let Some((value, _)) = index.iter().find(|(_, keys)| keys.len() > 1)
            {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique index '{}' on table '{}' has duplicate value {}",
                    def.field,
                    self.schema.name(),
                    value
                )));
            }
        }
        Ok(())
    }

    fn check_uniqueness(&self, key: &RecordKey, record: &Record) -> Result<()> {
        for def in self.schema.indexes.iter().filter(|d| d.unique) {
            let Some(value) = index_value(record.get(&def.field)) else {
                continue;
            };
            let conflict = self
                .indexes
                .get(&def.field)
                .and_then(|index| index.get(&value))
                .is_some_and(|keys| keys.iter().any(|k| k != key));
            if conflict {
                return Err(DbError::ConstraintViolation(format!(
                    "Unique constraint violation: '{}.{}' already contains value {}",
                    self.schema.name(),
                    def.field,
                    value
                )));
            }
        }
        Ok(())
    }

    fn update_indexes(&mut self, key: &RecordKey, record: &Record) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = index_value(record.get(field)) {
                index.entry(value).or_default().insert(key.clone());
            }
        }
    }

    fn remove_from_indexes(&mut self, key: &RecordKey, record: &Record) {
        for (field, index) in &mut self.indexes {
            if let Some(value) = index_value(record.get(field))
                && let Some(keys) = index.get_mut(&value)
            {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&value);
                }
            }
        }
    }
}
