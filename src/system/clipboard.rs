//! OS clipboard accessor
//!
//! The monitor only needs two reads (a change-count and the current text) and
//! one write. macOS exposes a real change-count on the general pasteboard;
//! elsewhere the count is synthesised from the text itself.

#[cfg(target_os = "macos")]
mod macos;

use cli_clipboard::{ClipboardContext, ClipboardProvider};
#[cfg(not(target_os = "macos"))]
use std::sync::{Mutex, MutexGuard};

use crate::shared::errors::{AppError, AppResult};

pub trait ClipboardAccess: Send + Sync {
    /// Opaque counter that moves whenever the clipboard is written
    fn change_count(&self) -> AppResult<u64>;

    /// Current text payload; `None` when the clipboard holds no text
    fn read_text(&self) -> AppResult<Option<String>>;

    /// Replace the clipboard contents with `text`
    fn write_text(&self, text: &str) -> AppResult<()>;
}

fn write_system_text(text: &str) -> AppResult<()> {
    ClipboardContext::new()
        .and_then(|mut ctx| ctx.set_contents(text.to_owned()))
        .map_err(|e| AppError::ClipboardWrite(e.to_string()))
}

/// Fragments of the wayland and x11 backend errors that mean "nothing
/// readable as text", as opposed to a clipboard that could not be reached
#[cfg_attr(target_os = "macos", allow(dead_code))]
const NO_TEXT_MARKERS: &[&str] = &[
    // wl-clipboard-rs
    "seat is empty",
    "no suitable type of content",
    // x11-clipboard
    "unexpected reply type",
    // payload that is not UTF-8 text
    "invalid utf-8",
];

/// Whether a backend read error just reports non-text or empty contents
#[cfg_attr(target_os = "macos", allow(dead_code))]
fn is_no_text_error(message: &str) -> bool {
    let message = message.to_lowercase();
    NO_TEXT_MARKERS.iter().any(|marker| message.contains(marker))
}

#[cfg(not(target_os = "macos"))]
fn read_system_text() -> AppResult<Option<String>> {
    let text = match ClipboardContext::new().and_then(|mut ctx| ctx.get_contents()) {
        Ok(text) => text,
        Err(e) if is_no_text_error(&e.to_string()) => return Ok(None),
        Err(e) => return Err(AppError::ClipboardRead(e.to_string())),
    };
    Ok(Some(text).filter(|t| !t.is_empty()))
}

/// Last text seen and the synthetic count derived from it
#[cfg(not(target_os = "macos"))]
#[derive(Default)]
struct ChangeTracker {
    count: u64,
    text: Option<String>,
}

/// The process-wide system clipboard
pub struct SystemClipboard {
    #[cfg(not(target_os = "macos"))]
    tracker: Mutex<ChangeTracker>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "macos"))]
            tracker: Mutex::new(ChangeTracker::default()),
        }
    }

    #[cfg(not(target_os = "macos"))]
    fn tracker(&self) -> MutexGuard<'_, ChangeTracker> {
        // Tracker fields are updated together, never left half-written
        self.tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
impl ClipboardAccess for SystemClipboard {
    fn change_count(&self) -> AppResult<u64> {
        Ok(macos::change_count())
    }

    fn read_text(&self) -> AppResult<Option<String>> {
        Ok(macos::read_string().filter(|t| !t.is_empty()))
    }

    fn write_text(&self, text: &str) -> AppResult<()> {
        write_system_text(text)
    }
}

#[cfg(not(target_os = "macos"))]
impl ClipboardAccess for SystemClipboard {
    // No native counter here, so every poll pays for one text read
    fn change_count(&self) -> AppResult<u64> {
        let current = read_system_text()?;
        let mut tracker = self.tracker();
        if tracker.text != current {
            tracker.count += 1;
            tracker.text = current;
        }
        Ok(tracker.count)
    }

    fn read_text(&self) -> AppResult<Option<String>> {
        Ok(self.tracker().text.clone())
    }

    fn write_text(&self, text: &str) -> AppResult<()> {
        write_system_text(text)?;
        let mut tracker = self.tracker();
        tracker.count += 1;
        tracker.text = Some(text.to_owned()).filter(|t| !t.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_text_errors_are_recognised() {
        assert!(is_no_text_error("The clipboard of the requested seat is empty"));
        assert!(is_no_text_error("No suitable type of content copied"));
        assert!(is_no_text_error("Unexpected Reply type: 301"));
        assert!(is_no_text_error("invalid utf-8 sequence of 1 bytes from index 0"));
        assert!(!is_no_text_error("Couldn't connect to the Wayland compositor"));
        assert!(!is_no_text_error("Connection refused"));
        assert!(!is_no_text_error("Selection timed out"));
    }
}
