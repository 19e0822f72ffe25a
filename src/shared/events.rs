use serde::{Deserialize, Serialize};

use super::types::{ClipboardEntry, EntryId};

/// Change notifications published by the history store after a mutation commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum HistoryEvent {
    #[serde(rename = "history://added")]
    EntryAdded(ClipboardEntry),

    /// Oldest entries dropped by the retention policy, oldest first
    #[serde(rename = "history://evicted")]
    EntriesEvicted(Vec<EntryId>),

    #[serde(rename = "history://deleted")]
    EntryDeleted(EntryId),

    #[serde(rename = "history://cleared")]
    HistoryCleared,
}
