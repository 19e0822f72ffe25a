//! Command modules for the CLI
//!
//! - `clipboard`: history listing, deletion, re-copy and the watch loop
//! - `settings`: effective settings resolution

pub mod clipboard;
pub mod settings;
