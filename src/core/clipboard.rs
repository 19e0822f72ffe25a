//! Clipboard module
//!
//! Provides clipboard history tracking and monitoring functionality.
//!
//! - `history`: owns the ordered entry collection, retention and change events
//! - `storage`: persistence backends behind the `Storage` trait
//! - `monitor`: polling loop that turns clipboard changes into entries
//! - `state`: detection state owned by the monitor

pub mod history;
pub mod monitor;
pub mod state;
pub mod storage;

pub use history::HistoryStore;
pub use monitor::{ClipboardMonitor, CycleOutcome};
pub use storage::{InMemoryStorage, RedbStorage, Storage};
