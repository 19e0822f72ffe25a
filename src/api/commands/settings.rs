//! Settings command module
//!
//! Resolves the settings file plus command-line overrides into the settings a
//! command actually runs with.

use crate::cli::Cli;
use crate::shared::settings::AppSettings;
use crate::shared::AppResult;

/// Load the settings file named by `--config` (or the default one) and apply
/// the global overrides. The result is validated.
pub async fn effective_settings(cli: &Cli) -> AppResult<AppSettings> {
    let mut settings = match &cli.config {
        Some(path) => AppSettings::load_from(path).await?,
        None => AppSettings::load().await?,
    };
    apply_overrides(&mut settings, cli);
    settings.validate()?;
    Ok(settings)
}

fn apply_overrides(settings: &mut AppSettings, cli: &Cli) {
    if let Some(path) = &cli.db {
        settings.history.database_path = Some(path.clone());
    }
    if cli.unbounded {
        settings.history.max_entries = None;
    } else if let Some(max) = cli.max_entries {
        settings.history.max_entries = Some(max);
    }
    if let Some(ms) = cli.interval_ms {
        settings.monitor.poll_interval_ms = ms;
    }
}

/// Print the effective settings as JSON
pub fn show_settings(settings: &AppSettings) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}
