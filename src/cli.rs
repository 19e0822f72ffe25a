use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::shared::types::EntryId;

#[derive(Debug, Parser)]
#[command(
    name = "clipboard-history",
    version,
    about = "Keeps a bounded, time-ordered history of copied text",
    long_about = "Polls the system clipboard, records each new text payload (skipping consecutive duplicates) in an embedded database, and lets you list, delete or re-copy entries."
)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// History database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Retention bound, overriding the settings file
    #[arg(long, global = true, conflicts_with = "unbounded")]
    pub max_entries: Option<usize>,

    /// Keep every entry
    #[arg(long, global = true)]
    pub unbounded: bool,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Keep history in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Monitor the clipboard and print history changes until Ctrl-C
    Watch,

    /// Show stored entries, newest first
    List {
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete one entry
    Delete { id: EntryId },

    /// Delete every entry
    Clear,

    /// Put an entry back on the clipboard
    Copy { id: EntryId },

    /// Print the effective settings
    Settings,
}
