use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::AppError;

/// Stable identifier of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntryId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| AppError::Validation(format!("Invalid entry id '{}': {}", s, e)))
    }
}

/// A single captured clipboard snapshot
///
/// Entries are immutable once created; only the history store constructs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    id: EntryId,
    content: String,
    timestamp: DateTime<Utc>,
}

impl ClipboardEntry {
    pub(crate) fn new(content: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            content,
            timestamp,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Single-line excerpt of the content for listings.
    ///
    /// Whitespace runs collapse to one space; text longer than `max_chars`
    /// characters is cut on a character boundary and ends with an ellipsis.
    pub fn preview(&self, max_chars: usize) -> String {
        let flat = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() <= max_chars {
            return flat;
        }
        let mut cut: String = flat.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_parse_roundtrip() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entry_id_rejects_garbage() {
        let err = "not-an-id".parse::<EntryId>().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        let entry = ClipboardEntry::new("line one\n\tline two".to_string(), Utc::now());
        assert_eq!(entry.preview(80), "line one line two");
        assert_eq!(entry.preview(4), "line…");
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let entry = ClipboardEntry::new("héllo wörld".to_string(), Utc::now());
        assert_eq!(entry.preview(2), "hé…");
    }
}
