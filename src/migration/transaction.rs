use crate::core::{ReadOptions, Record, RecordKey, Result, SchemaVersion, WriteOptions};
use crate::middleware::MiddlewareChain;
use crate::storage::StoreImage;

/// Access to the staged store image while a migration step runs.
///
/// Nothing done here is durable until the runner commits the image for
/// [`version`](Self::version); a failing step leaves the committed store at
/// the previous version.
pub struct UpgradeTransaction<'a> {
    image: &'a mut StoreImage,
    middleware: &'a MiddlewareChain,
    version: SchemaVersion,
    writes: usize,
}

impl<'a> UpgradeTransaction<'a> {
    pub fn new(image: &'a mut StoreImage, middleware: &'a MiddlewareChain, version: SchemaVersion) -> Self {
        Self {
            image,
            middleware,
            version,
            writes: 0,
        }
    }

    /// The version this transaction produces.
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Number of records written or removed so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn table_names(&self) -> Vec<String> {
        self.image.table_names()
    }

    pub fn read_all(&self, table: &str, options: ReadOptions) -> Result<Vec<Record>> {
        let records = self.image.table(table)?.records();
        if options.bypass_middleware {
            return Ok(records);
        }
        records
            .into_iter()
            .map(|record| self.middleware.after_read(table, record))
            .collect()
    }

    pub fn put(&mut self, table: &str, record: Record, options: WriteOptions) -> Result<RecordKey> {
        let record = if options.bypass_middleware {
            record
        } else {
            self.middleware.before_write(table, record)?
        };
        let key = self.image.table_mut(table)?.put(record)?;
        self.writes += 1;
        Ok(key)
    }

    pub fn bulk_put(&mut self, table: &str, records: Vec<Record>, options: WriteOptions) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.put(table, record, options)?;
        }
        Ok(count)
    }

    /// Reads every record of `table`, applies `f` and writes each one back.
    ///
    /// The read uses the same middleware bypass as the write, so a bypassed
    /// modify sees and stores the raw representation.
    pub fn modify<F>(&mut self, table: &str, options: WriteOptions, mut f: F) -> Result<usize>
    where
        F: FnMut(&mut Record) -> Result<()>,
    {
        let read_options = ReadOptions {
            bypass_middleware: options.bypass_middleware,
        };
        let records = self.read_all(table, read_options)?;
        let count = records.len();
        for mut record in records {
            f(&mut record)?;
            self.put(table, record, options)?;
        }
        Ok(count)
    }

    pub fn delete(&mut self, table: &str, key: &RecordKey) -> Result<bool> {
        let removed = self.image.table_mut(table)?.delete(key);
        if removed {
            self.writes += 1;
        }
        Ok(removed)
    }

    /// Removes every record of `table`, returning how many were removed.
    pub fn clear(&mut self, table: &str) -> Result<usize> {
        let set = self.image.table_mut(table)?;
        let count = set.count();
        set.clear();
        self.writes += count;
        Ok(count)
    }

    pub fn count(&self, table: &str) -> Result<usize> {
        Ok(self.image.table(table)?.count())
    }
}
