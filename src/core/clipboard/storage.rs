//! Persistence backends for clipboard history
//!
//! Entries are keyed by `(timestamp_micros, sequence)` so iteration order is
//! chronological even when two captures share a timestamp. Eviction runs in the
//! same write transaction as the insert that caused it.

use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use crate::shared::errors::{AppError, AppResult};
use crate::shared::types::{ClipboardEntry, EntryId};

/// Ordering key: (timestamp in microseconds, insertion sequence)
type EntryKey = (i64, u64);

/// Key: ordering key, Value: CBOR-encoded ClipboardEntry
const ENTRIES_TABLE: TableDefinition<EntryKey, &[u8]> = TableDefinition::new("clipboard_entries");

/// Key: entry id, Value: ordering key in ENTRIES_TABLE
const ID_INDEX_TABLE: TableDefinition<&str, EntryKey> = TableDefinition::new("clipboard_entry_ids");

const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("clipboard_meta");
const NEXT_SEQUENCE: &str = "next_sequence";

/// Storage trait for clipboard history persistence
pub trait Storage: Send + Sync {
    /// Persist `entry`, then drop the oldest entries until at most
    /// `max_entries` remain. Returns the evicted ids, oldest first.
    fn insert(&self, entry: &ClipboardEntry, max_entries: Option<usize>) -> AppResult<Vec<EntryId>>;

    /// Newest first
    fn load_ordered(&self, limit: Option<usize>) -> AppResult<Vec<ClipboardEntry>>;

    fn most_recent(&self) -> AppResult<Option<ClipboardEntry>> {
        Ok(self.load_ordered(Some(1))?.into_iter().next())
    }

    fn get(&self, id: &EntryId) -> AppResult<Option<ClipboardEntry>>;

    /// Returns whether an entry was removed
    fn remove(&self, id: &EntryId) -> AppResult<bool>;

    /// Returns how many entries were removed
    fn clear_all(&self) -> AppResult<usize>;

    fn count(&self) -> AppResult<usize>;
}

fn encode(entry: &ClipboardEntry) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(entry, &mut bytes)?;
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> AppResult<ClipboardEntry> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Redb-based storage implementation
pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    /// Open (or create) the database file at `path`.
    ///
    /// Any failure here is a configuration error: without a store there is
    /// nothing for the monitor to do.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Configuration(format!("Failed to create data directory: {}", e))
            })?;
        }

        let db = Database::create(path)?;

        // Create tables up front so read transactions never see them missing
        let init = || -> AppResult<()> {
            let write_txn = db.begin_write()?;
            {
                write_txn.open_table(ENTRIES_TABLE)?;
                write_txn.open_table(ID_INDEX_TABLE)?;
                write_txn.open_table(META_TABLE)?;
            }
            write_txn.commit()?;
            Ok(())
        };
        init().map_err(|e| AppError::Configuration(format!("Failed to initialize tables: {}", e)))?;

        debug!(path = %path.display(), "opened history database");
        Ok(Self { db })
    }
}

impl Storage for RedbStorage {
    fn insert(&self, entry: &ClipboardEntry, max_entries: Option<usize>) -> AppResult<Vec<EntryId>> {
        let bytes = encode(entry)?;
        let id = entry.id().to_string();
        let mut evicted = Vec::new();

        let write_txn = self.db.begin_write()?;
        {
            let mut entries = write_txn.open_table(ENTRIES_TABLE)?;
            let mut ids = write_txn.open_table(ID_INDEX_TABLE)?;
            let mut meta = write_txn.open_table(META_TABLE)?;

            let sequence = meta.get(NEXT_SEQUENCE)?.map(|v| v.value()).unwrap_or(0);
            meta.insert(NEXT_SEQUENCE, sequence + 1)?;

            let key: EntryKey = (entry.timestamp().timestamp_micros(), sequence);
            entries.insert(key, bytes.as_slice())?;
            ids.insert(id.as_str(), key)?;

            if let Some(max) = max_entries {
                let len = entries.len()? as usize;
                for _ in max..len {
                    let victim = match entries.pop_first()? {
                        Some((_, value)) => decode(value.value())?,
                        None => break,
                    };
                    ids.remove(victim.id().to_string().as_str())?;
                    evicted.push(victim.id());
                }
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }

    fn load_ordered(&self, limit: Option<usize>) -> AppResult<Vec<ClipboardEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;

        let mut items = Vec::new();
        // Range iterators are double-ended, newest entries sit at the back
        for entry in table.iter()?.rev().take(limit.unwrap_or(usize::MAX)) {
            let (_, value) = entry?;
            items.push(decode(value.value())?);
        }

        Ok(items)
    }

    fn get(&self, id: &EntryId) -> AppResult<Option<ClipboardEntry>> {
        let read_txn = self.db.begin_read()?;
        let ids = read_txn.open_table(ID_INDEX_TABLE)?;
        let entries = read_txn.open_table(ENTRIES_TABLE)?;

        let Some(key) = ids.get(id.to_string().as_str())?.map(|v| v.value()) else {
            return Ok(None);
        };
        match entries.get(key)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Err(AppError::Persistence(format!(
                "Index points at missing entry for id {}",
                id
            ))),
        }
    }

    fn remove(&self, id: &EntryId) -> AppResult<bool> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut ids = write_txn.open_table(ID_INDEX_TABLE)?;
            let mut entries = write_txn.open_table(ENTRIES_TABLE)?;

            let key = ids.remove(id.to_string().as_str())?.map(|v| v.value());
            match key {
                Some(key) => {
                    entries.remove(key)?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;

        Ok(removed)
    }

    fn clear_all(&self) -> AppResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut entries = write_txn.open_table(ENTRIES_TABLE)?;
            let mut ids = write_txn.open_table(ID_INDEX_TABLE)?;

            let removed = entries.len()? as usize;
            entries.retain(|_, _| false)?;
            ids.retain(|_, _| false)?;
            removed
        };
        write_txn.commit()?;

        Ok(removed)
    }

    fn count(&self) -> AppResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;
        Ok(table.len()? as usize)
    }
}

/// Volatile storage for tests and `--ephemeral` runs
pub struct InMemoryStorage {
    // Oldest first, same order as the redb key space
    items: Mutex<Vec<ClipboardEntry>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Vec<ClipboardEntry>>> {
        self.items
            .lock()
            .map_err(|e| AppError::Persistence(format!("Mutex poisoned: {}", e)))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for InMemoryStorage {
    fn insert(&self, entry: &ClipboardEntry, max_entries: Option<usize>) -> AppResult<Vec<EntryId>> {
        let mut items = self.lock()?;
        // Equal timestamps keep insertion order
        let at = items.partition_point(|e| e.timestamp() <= entry.timestamp());
        items.insert(at, entry.clone());

        let overflow = max_entries.map_or(0, |max| items.len().saturating_sub(max));
        Ok(items.drain(..overflow).map(|e| e.id()).collect())
    }

    fn load_ordered(&self, limit: Option<usize>) -> AppResult<Vec<ClipboardEntry>> {
        let items = self.lock()?;
        Ok(items
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    fn get(&self, id: &EntryId) -> AppResult<Option<ClipboardEntry>> {
        let items = self.lock()?;
        Ok(items.iter().find(|e| e.id() == *id).cloned())
    }

    fn remove(&self, id: &EntryId) -> AppResult<bool> {
        let mut items = self.lock()?;
        let before = items.len();
        items.retain(|e| e.id() != *id);
        Ok(items.len() != before)
    }

    fn clear_all(&self) -> AppResult<usize> {
        let mut items = self.lock()?;
        let removed = items.len();
        items.clear();
        Ok(removed)
    }

    fn count(&self) -> AppResult<usize> {
        Ok(self.lock()?.len())
    }
}
