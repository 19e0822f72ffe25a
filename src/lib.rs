pub mod api;
pub mod cli;
pub mod core;
pub mod logging;
pub mod shared;
pub mod system;

pub use crate::core::clipboard::{ClipboardMonitor, CycleOutcome, HistoryStore};
pub use shared::types::{ClipboardEntry, EntryId};
pub use shared::{AppError, AppResult};

use api::commands;
use cli::{Cli, Command};

/// Resolve settings, open the history store and run one CLI command
pub async fn run(cli: Cli) -> AppResult<()> {
    let settings = commands::settings::effective_settings(&cli).await?;

    if let Command::Settings = cli.command {
        return commands::settings::show_settings(&settings);
    }

    let history = commands::clipboard::open_history(&settings, cli.ephemeral)?;

    match cli.command {
        Command::Watch => commands::clipboard::watch(history, &settings).await,
        Command::List { limit, json } => {
            commands::clipboard::list(&history, limit, json, settings.display.preview_chars)
        }
        Command::Delete { id } => commands::clipboard::delete(&history, &id),
        Command::Clear => commands::clipboard::clear(&history),
        Command::Copy { id } => commands::clipboard::copy(history, &settings, &id),
        Command::Settings => commands::settings::show_settings(&settings),
    }
}
