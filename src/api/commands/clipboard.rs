//! Clipboard history commands
//!
//! redb holds an exclusive lock on the database file, so while `watch` runs it
//! is the only process that can touch the history. It therefore also accepts
//! the user commands (`list`, `delete`, `clear`, `copy`, `pause`, `resume`) as
//! lines on stdin and runs them against its own store and monitor.

use chrono::Local;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::clipboard::{ClipboardMonitor, HistoryStore};
use crate::shared::events::HistoryEvent;
use crate::shared::settings::AppSettings;
use crate::shared::types::{ClipboardEntry, EntryId};
use crate::shared::{AppError, AppResult};
use crate::system::clipboard::SystemClipboard;

const WATCH_HELP: &str = "commands: list [N] | delete <ID> | clear | copy <ID> | pause | resume | help";

/// Open the configured store, or a throwaway in-memory one
pub fn open_history(settings: &AppSettings, ephemeral: bool) -> AppResult<HistoryStore> {
    if ephemeral {
        debug!("using in-memory history");
        return Ok(HistoryStore::in_memory(settings.history.max_entries));
    }
    HistoryStore::open(settings)
}

fn system_monitor(history: HistoryStore, settings: &AppSettings) -> ClipboardMonitor {
    ClipboardMonitor::new(
        Arc::new(SystemClipboard::new()),
        history,
        settings.poll_interval(),
    )
}

/// A line typed into a running `watch`
#[derive(Debug, Clone, PartialEq, Eq)]
enum WatchCommand {
    List(Option<usize>),
    Delete(EntryId),
    Clear,
    Copy(EntryId),
    Pause,
    Resume,
    Help,
}

impl FromStr for WatchCommand {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();
        if words.next().is_some() {
            return Err(AppError::Validation(format!("Too many arguments: '{}'", line.trim())));
        }

        let id = |arg: Option<&str>| -> AppResult<EntryId> {
            arg.ok_or_else(|| AppError::Validation(format!("'{}' needs an entry id", verb)))?
                .parse()
        };

        match (verb.as_str(), arg) {
            ("list" | "ls", None) => Ok(Self::List(None)),
            ("list" | "ls", Some(n)) => n
                .parse()
                .map(|n| Self::List(Some(n)))
                .map_err(|_| AppError::Validation(format!("Invalid limit '{}'", n))),
            ("delete" | "rm", arg) => Ok(Self::Delete(id(arg)?)),
            ("copy" | "cp", arg) => Ok(Self::Copy(id(arg)?)),
            ("clear", None) => Ok(Self::Clear),
            ("pause", None) => Ok(Self::Pause),
            ("resume", None) => Ok(Self::Resume),
            ("help" | "?", None) => Ok(Self::Help),
            _ => Err(AppError::Validation(format!(
                "Unknown command '{}' ({})",
                line.trim(),
                WATCH_HELP
            ))),
        }
    }
}

/// Run one watch command against the live store and monitor
fn execute(monitor: &ClipboardMonitor, command: WatchCommand, preview_chars: usize) -> AppResult<String> {
    let history = monitor.history();
    match command {
        WatchCommand::List(limit) => {
            let entries = match limit {
                Some(limit) => history.query_recent(limit)?,
                None => history.query_ordered()?,
            };
            render_list(&entries, false, preview_chars)
        }
        WatchCommand::Delete(id) => delete_entry(history, &id),
        WatchCommand::Clear => clear_history(history),
        WatchCommand::Copy(id) => {
            monitor.copy_entry(&id)?;
            Ok(format!("Copied {}", id))
        }
        WatchCommand::Pause => {
            monitor.pause();
            Ok("Recording paused".to_string())
        }
        WatchCommand::Resume => {
            monitor.resume();
            Ok("Recording resumed".to_string())
        }
        WatchCommand::Help => Ok(WATCH_HELP.to_string()),
    }
}

/// Forward stdin lines to the watch loop.
///
/// A plain thread rather than a runtime task: a blocked stdin read would
/// otherwise hold up runtime shutdown until the next newline.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("watch-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to read command from stdin");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "stdin commands unavailable");
    }
    rx
}

async fn run_watch_line(monitor: &Arc<ClipboardMonitor>, line: &str, preview_chars: usize) {
    if line.trim().is_empty() {
        return;
    }
    let command = match line.parse::<WatchCommand>() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            return;
        }
    };

    // `copy` may wait for an in-flight cycle, keep it off the runtime threads
    let monitor = Arc::clone(monitor);
    match tokio::task::spawn_blocking(move || execute(&monitor, command, preview_chars)).await {
        Ok(Ok(output)) => println!("{}", output),
        Ok(Err(e)) => eprintln!("Error: {}", e),
        Err(e) => error!(error = %e, "watch command panicked"),
    }
}

/// Monitor the clipboard, print history events and serve stdin commands
/// until Ctrl-C
pub async fn watch(history: HistoryStore, settings: &AppSettings) -> AppResult<()> {
    let preview_chars = settings.display.preview_chars;
    let mut events = history.subscribe();
    let monitor = Arc::new(system_monitor(history, settings));

    monitor.start_monitoring()?;
    info!(
        interval_ms = settings.monitor.poll_interval_ms,
        max_entries = ?settings.history.max_entries,
        "watching clipboard"
    );
    eprintln!("{}", WATCH_HELP);

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                match signal {
                    Ok(()) => info!("received Ctrl-C"),
                    Err(e) => error!(error = %e, "failed to listen for Ctrl-C"),
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe_event(&event, preview_chars)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            line = commands.recv(), if stdin_open => match line {
                Some(line) => run_watch_line(&monitor, &line, preview_chars).await,
                None => {
                    debug!("stdin closed, watching without commands");
                    stdin_open = false;
                }
            },
        }
    }

    monitor.shutdown().await;
    info!("clipboard monitor stopped");
    Ok(())
}

/// Print stored entries, newest first
pub fn list(
    history: &HistoryStore,
    limit: Option<usize>,
    json: bool,
    preview_chars: usize,
) -> AppResult<()> {
    let entries = match limit {
        Some(limit) => history.query_recent(limit)?,
        None => history.query_ordered()?,
    };
    println!("{}", render_list(&entries, json, preview_chars)?);
    Ok(())
}

fn delete_entry(history: &HistoryStore, id: &EntryId) -> AppResult<String> {
    if history.get(id)?.is_none() {
        return Ok(format!("No entry {}", id));
    }
    history.delete(id)?;
    Ok(format!("Deleted {}", id))
}

fn clear_history(history: &HistoryStore) -> AppResult<String> {
    let removed = history.count()?;
    history.delete_all()?;
    Ok(format!("Cleared {} entries", removed))
}

pub fn delete(history: &HistoryStore, id: &EntryId) -> AppResult<()> {
    println!("{}", delete_entry(history, id)?);
    Ok(())
}

pub fn clear(history: &HistoryStore) -> AppResult<()> {
    println!("{}", clear_history(history)?);
    Ok(())
}

/// Put a stored entry back on the system clipboard.
///
/// Only usable when no `watch` holds the database; a running `watch` takes
/// the same request as a `copy <ID>` line on stdin.
pub fn copy(history: HistoryStore, settings: &AppSettings, id: &EntryId) -> AppResult<()> {
    system_monitor(history, settings).copy_entry(id)?;
    println!("Copied {}", id);
    Ok(())
}

fn format_entry(entry: &ClipboardEntry, preview_chars: usize) -> String {
    format!(
        "{}  {}  {}",
        entry.id(),
        entry.timestamp().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        entry.preview(preview_chars)
    )
}

fn render_list(entries: &[ClipboardEntry], json: bool, preview_chars: usize) -> AppResult<String> {
    if json {
        return Ok(serde_json::to_string_pretty(entries)?);
    }
    if entries.is_empty() {
        return Ok("Clipboard history is empty".to_string());
    }
    Ok(entries
        .iter()
        .map(|entry| format_entry(entry, preview_chars))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn describe_event(event: &HistoryEvent, preview_chars: usize) -> String {
    match event {
        HistoryEvent::EntryAdded(entry) => format!("+ {}", format_entry(entry, preview_chars)),
        HistoryEvent::EntriesEvicted(ids) => {
            let ids = ids.iter().map(ToString::to_string).collect::<Vec<_>>();
            format!("- evicted {}", ids.join(", "))
        }
        HistoryEvent::EntryDeleted(id) => format!("- deleted {}", id),
        HistoryEvent::HistoryCleared => "- history cleared".to_string(),
    }
}
