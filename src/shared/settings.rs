use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use super::errors::{AppError, AppResult};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_ENTRIES: usize = 200;
pub const DEFAULT_PREVIEW_CHARS: usize = 80;

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "clipboard_history.redb";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub monitor: MonitorSettings,
    pub history: HistorySettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Retention bound; `None` keeps everything
    pub max_entries: Option<usize>,
    /// Overrides the platform data directory
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub preview_chars: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            monitor: MonitorSettings::default(),
            history: HistorySettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            database_path: None,
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

fn project_dirs() -> AppResult<ProjectDirs> {
    ProjectDirs::from("com", "antigravity", "clipboard-history").ok_or_else(|| {
        AppError::Configuration("Failed to determine project directories".to_string())
    })
}

impl AppSettings {
    pub fn get_settings_path() -> AppResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join(SETTINGS_FILE))
    }

    /// Load from the default location, writing defaults on first run
    pub async fn load() -> AppResult<Self> {
        let path = Self::get_settings_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            let settings = Self::default();
            settings.save_to(path).await?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            AppError::Configuration(format!("Failed to read settings file: {}", e))
        })?;

        let settings: Self = serde_json::from_str(&content)
            .map_err(|e| AppError::Configuration(format!("Failed to parse settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Configuration(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;

        fs::write(path, content).await.map_err(|e| {
            AppError::Configuration(format!("Failed to write settings file: {}", e))
        })
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.monitor.poll_interval_ms == 0 {
            return Err(AppError::Configuration(
                "monitor.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history.max_entries == Some(0) {
            return Err(AppError::Configuration(
                "history.max_entries must be at least 1 (use null for unbounded)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.poll_interval_ms)
    }

    /// Explicit database path, else `clipboard_history.redb` in the data dir
    pub fn database_path(&self) -> AppResult<PathBuf> {
        match &self.history.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs()?.data_dir().join(DATABASE_FILE)),
        }
    }
}
