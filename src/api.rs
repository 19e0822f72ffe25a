//! Command handlers behind the `clipboard-history` binary
pub mod commands;
