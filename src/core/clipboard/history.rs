use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::storage::{InMemoryStorage, RedbStorage, Storage};
use crate::shared::emit::emit_event;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::events::HistoryEvent;
use crate::shared::settings::AppSettings;
use crate::shared::types::{ClipboardEntry, EntryId};

/// Buffered events per subscriber before slow receivers start lagging
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Owner of the clipboard history
///
/// Cloning is cheap; clones share the same storage, write lock and event
/// channel.
#[derive(Clone)]
pub struct HistoryStore {
    storage: Arc<dyn Storage>,
    max_entries: Option<usize>,
    // Serialises mutation + notification so events go out in commit order
    write_lock: Arc<Mutex<()>>,
    events: broadcast::Sender<HistoryEvent>,
}

impl HistoryStore {
    /// Open the persistent history described by `settings`.
    ///
    /// Failing to open the database is fatal: there is no in-memory fallback.
    pub fn open(settings: &AppSettings) -> AppResult<Self> {
        let path = settings.database_path()?;
        let storage = RedbStorage::open(&path).map_err(|e| match e {
            AppError::Configuration(_) => e,
            other => AppError::Configuration(other.to_string()),
        })?;
        info!(path = %path.display(), max_entries = ?settings.history.max_entries, "history store opened");
        Ok(Self::with_storage(Arc::new(storage), settings.history.max_entries))
    }

    /// History that lives only as long as the process
    pub fn in_memory(max_entries: Option<usize>) -> Self {
        Self::with_storage(Arc::new(InMemoryStorage::new()), max_entries)
    }

    pub fn with_storage(storage: Arc<dyn Storage>, max_entries: Option<usize>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            storage,
            max_entries,
            write_lock: Arc::new(Mutex::new(())),
            events,
        }
    }

    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create and persist a new entry, evicting the oldest ones past the
    /// retention bound in the same transaction.
    pub fn insert(&self, content: String, timestamp: DateTime<Utc>) -> AppResult<EntryId> {
        if content.is_empty() {
            return Err(AppError::Validation(
                "Clipboard entry content must not be empty".to_string(),
            ));
        }

        let entry = ClipboardEntry::new(content, timestamp);
        let id = entry.id();

        let _guard = self.lock_writes();
        let mut evicted = self.storage.insert(&entry, self.max_entries)?;

        // An entry older than the whole retained window is evicted by its own
        // insert; subscribers never saw it, so neither event mentions it
        let before = evicted.len();
        evicted.retain(|gone| *gone != id);
        if evicted.len() == before {
            debug!(%id, chars = entry.content().chars().count(), "inserted history entry");
            emit_event(&self.events, HistoryEvent::EntryAdded(entry));
        } else {
            debug!(%id, "inserted entry fell outside the retention window");
        }
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "retention evicted oldest entries");
            emit_event(&self.events, HistoryEvent::EntriesEvicted(evicted));
        }

        Ok(id)
    }

    /// Snapshot of every entry, newest first
    pub fn query_ordered(&self) -> AppResult<Vec<ClipboardEntry>> {
        self.storage.load_ordered(None)
    }

    /// At most `limit` entries, newest first
    pub fn query_recent(&self, limit: usize) -> AppResult<Vec<ClipboardEntry>> {
        self.storage.load_ordered(Some(limit))
    }

    pub fn most_recent(&self) -> AppResult<Option<ClipboardEntry>> {
        self.storage.most_recent()
    }

    pub fn get(&self, id: &EntryId) -> AppResult<Option<ClipboardEntry>> {
        self.storage.get(id)
    }

    /// Remove one entry. Absent ids are a no-op.
    pub fn delete(&self, id: &EntryId) -> AppResult<()> {
        let _guard = self.lock_writes();
        if self.storage.remove(id)? {
            debug!(%id, "deleted history entry");
            emit_event(&self.events, HistoryEvent::EntryDeleted(*id));
        } else {
            debug!(%id, "delete requested for unknown entry");
        }
        Ok(())
    }

    pub fn delete_all(&self) -> AppResult<()> {
        let _guard = self.lock_writes();
        let removed = self.storage.clear_all()?;
        info!(removed, "cleared clipboard history");
        emit_event(&self.events, HistoryEvent::HistoryCleared);
        Ok(())
    }

    pub fn count(&self) -> AppResult<usize> {
        self.storage.count()
    }

    /// Change notifications for mutations committed after this call
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("max_entries", &self.max_entries)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
