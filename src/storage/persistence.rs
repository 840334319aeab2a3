//! Write-Ahead Logging (WAL) and snapshots for a single database

use crate::core::{DbError, Record, RecordKey, Result, SchemaVersion};
use crate::storage::image::StoreImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use chrono::Utc;
use tempfile::NamedTempFile;

pub const WAL_FILE: &str = "store.wal";
pub const SNAPSHOT_FILE: &str = "store.snapshot";
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;

// ============================================================================
// WAL Entry Types
// ============================================================================

/// Writes recorded between two snapshots.
///
/// Schema changes never go through the WAL: a version change is always
/// committed as a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    Put { table: String, record: Record },
    Delete { table: String, key: RecordKey },
    Clear { table: String },
}

/// A WAL entry tagged with the snapshot generation it was written after.
///
/// Recovery only replays records whose generation matches the loaded
/// snapshot. Records left behind by a crash between a snapshot write and the
/// WAL truncation belong to an older generation and are discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub generation: u64,
    pub entry: WalEntry,
}

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub format_version: u16,
    pub metadata: SnapshotMetadata,
    pub image: StoreImage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub schema_version: SchemaVersion,
    /// Incremented by every checkpoint
    pub generation: u64,
    pub created_at_unix_ms: i64,
    pub record_count: usize,
    pub table_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(image: StoreImage, generation: u64) -> Self {
        let metadata = SnapshotMetadata {
            schema_version: image.version(),
            generation,
            created_at_unix_ms: Utc::now().timestamp_millis(),
            record_count: image.record_count(),
            table_count: image.table_names().len(),
        };
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            metadata,
            image,
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurabilityMode {
    /// fsync after every WAL append
    Sync,
    /// flush to the OS after every WAL append
    #[default]
    Async,
    /// snapshots only; writes between snapshots are lost on crash
    None,
}

impl std::str::FromStr for DurabilityMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" => Ok(Self::None),
            other => Err(DbError::ExecutionError(format!(
                "Unknown durability mode '{}' (expected sync, async or none)",
                other
            ))),
        }
    }
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    generation: u64,
    entries_since_checkpoint: usize,
}

impl WalManager {
    /// Opens the WAL; new records are tagged with `generation`.
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode, generation: u64) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| DbError::IoError(format!("Failed to create WAL directory: {}", e)))?;
        }

        let wal_file = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new().create(true).append(true).open(&wal_path)
                .map_err(|e| DbError::IoError(format!("Failed to open WAL file: {}", e)))?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            generation,
            entries_since_checkpoint: 0,
        })
    }

    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None { return Ok(()); }
        let file = self.wal_file.as_mut().ok_or_else(|| DbError::ExecutionError("WAL file not initialized".to_string()))?;
        let record = WalRecord {
            generation: self.generation,
            entry: entry.clone(),
        };
        let serialized = rmp_serde::to_vec(&record).map_err(|e| DbError::SerializationError(format!("Failed to serialize WAL entry: {}", e)))?;
        let len = serialized.len() as u32;
        file.write_all(&len.to_le_bytes()).map_err(|e| DbError::IoError(format!("Failed to write WAL: {}", e)))?;
        file.write_all(&serialized).map_err(|e| DbError::IoError(format!("Failed to write WAL: {}", e)))?;
        file.flush().map_err(|e| DbError::IoError(format!("Failed to flush WAL: {}", e)))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut().sync_all().map_err(|e| DbError::IoError(format!("Failed to sync WAL: {}", e)))?;
        }
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    /// Reads every complete record.
    ///
    /// A torn tail (length prefix without its full payload, as left by a crash
    /// mid-append) ends the log instead of failing recovery.
    pub fn read_all(&self) -> Result<Vec<WalRecord>> {
        if !self.wal_path.exists() { return Ok(Vec::new()); }
        let file = File::open(&self.wal_path).map_err(|e| DbError::IoError(format!("Failed to open WAL for reading: {}", e)))?;
        let mut remaining = file.metadata().map_err(|e| DbError::IoError(format!("Failed to stat WAL: {}", e)))?.len();
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(DbError::IoError(format!("Failed to read WAL entry length: {}", e))),
            }
            remaining = remaining.saturating_sub(len_bytes.len() as u64);
            let len = u32::from_le_bytes(len_bytes) as u64;
            if len > remaining {
                log::warn!(
                    "Ignoring torn WAL tail in {} after {} entries ({} byte entry, {} bytes left)",
                    self.wal_path.display(),
                    entries.len(),
                    len,
                    remaining
                );
                break;
            }
            remaining -= len;
            let mut data = vec![0u8; len as usize];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::warn!(
                        "Ignoring torn WAL tail in {} after {} entries",
                        self.wal_path.display(),
                        entries.len()
                    );
                    break;
                }
                Err(e) => return Err(DbError::IoError(format!("Failed to read WAL entry data: {}", e))),
            }
            let record: WalRecord = rmp_serde::from_slice(&data).map_err(|e| DbError::SerializationError(format!("Failed to deserialize WAL entry: {}", e)))?;
            entries.push(record);
        }
        Ok(entries)
    }

    /// Truncates the log; later records are tagged with `generation`.
    pub fn clear(&mut self, generation: u64) -> Result<()> {
        self.generation = generation;
        if self.durability_mode == DurabilityMode::None { return Ok(()); }
        self.wal_file = None;
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.wal_path)
            .map_err(|e| DbError::IoError(format!("Failed to truncate WAL: {}", e)))?;
        drop(file);
        let file = OpenOptions::new().append(true).open(&self.wal_path)
            .map_err(|e| DbError::IoError(format!("Failed to reopen WAL: {}", e)))?;
        self.wal_file = Some(BufWriter::new(file));
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Atomically replaces the snapshot file.
    pub fn save(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        let parent = self.snapshot_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| DbError::IoError(format!("Failed to create snapshot directory: {}", e)))?;
        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| DbError::SerializationError(format!("Failed to serialize snapshot: {}", e)))?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&serialized).map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
        temp.as_file().sync_all().map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path).map_err(|e| DbError::IoError(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() { return Ok(None); }
        let mut file = File::open(&self.snapshot_path).map_err(|e| DbError::IoError(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| DbError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let mut snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data).map_err(|e| DbError::SerializationError(format!("Failed to deserialize snapshot: {}", e)))?;
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(DbError::SerializationError(format!(
                "Unsupported snapshot format {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        snapshot.image.rebuild_indexes();
        Ok(Some(snapshot))
    }

    /// Schema version of the snapshot, if one exists. Reads only.
    pub fn version(&self) -> Result<Option<SchemaVersion>> {
        Ok(self.load()?.map(|s| s.metadata.schema_version))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(db_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        let snapshot = SnapshotManager::new(db_dir.join(SNAPSHOT_FILE));
        let generation = snapshot.load()?.map(|s| s.metadata.generation).unwrap_or(0);
        let wal = WalManager::new(db_dir.join(WAL_FILE), durability_mode, generation)?;
        Ok(Self { wal, snapshot })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    /// Writes `image` as the new snapshot and truncates the WAL.
    ///
    /// Snapshots are written in every durability mode: they are the only
    /// place a schema version change is recorded.
    pub fn checkpoint(&mut self, image: &StoreImage) -> Result<()> {
        let generation = self.wal.generation() + 1;
        self.snapshot.save(&DatabaseSnapshot::new(image.clone(), generation))?;
        self.wal.clear(generation)?;
        Ok(())
    }

    /// Loads the snapshot and replays the WAL records of its generation.
    pub fn recover(&self) -> Result<Option<StoreImage>> {
        let Some(snapshot) = self.snapshot.load()? else {
            return Ok(None);
        };
        let generation = snapshot.metadata.generation;
        let mut image = snapshot.image;
        let mut stale = 0usize;
        for record in self.wal.read_all()? {
            if record.generation == generation {
                image.replay(record.entry)?;
            } else {
                stale += 1;
            }
        }
        if stale > 0 {
            log::warn!(
                "Discarded {} WAL entries of '{}' written before snapshot generation {}",
                stale,
                image.name(),
                generation
            );
        }
        Ok(Some(image))
    }

    pub fn wal(&self) -> &WalManager { &self.wal }
}
