//! Application settings loaded from `config.toml` and the environment.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Platform;

/// Directory name used under the platform config/data directories.
pub const APP_DIR: &str = "gamedice";

const ENV_PREFIX: &str = "GAMEDICE";

const DEFAULT_CONFIG: &str = r#"# gamedice settings. Every key is optional.
# Environment variables override values here, e.g. GAMEDICE__TRACKER__TICK_SECS=5

[library]
# platforms = ["steam", "epic", "gog", "riot", "amazon", "xbox", "ubisoft"]
# store_path = "/path/to/library.json"

[tracker]
# tick_secs = 2
# confirm_window_secs = 120
# stop_after_gone_secs = 20
# min_session_secs = 5

[picker]
# "steam_hours" weighs by Steam API hours only; "any_hours" also uses tracked hours.
# weighting = "steam_hours"

[history]
# max_entries = 1000

[steam]
# steam_id64 = "7656119..."
# http_timeout_secs = 12
# tag_import_concurrency = 6
# tag_import_progress_every = 10
"#;

/// Top-level application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Library scanning and persistence.
    pub library: LibrarySettings,
    /// Session tracker tunables.
    pub tracker: TrackerSettings,
    /// Random picker policy.
    pub picker: PickerSettings,
    /// Launch history ledger.
    pub history: HistorySettings,
    /// Steam web API clients.
    pub steam: SteamSettings,
}

/// Which platforms are scanned and where the store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Enabled platforms.
    pub platforms: Vec<Platform>,
    /// Override for the persisted store location.
    pub store_path: Option<PathBuf>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            platforms: Platform::ALL.to_vec(),
            store_path: None,
        }
    }
}

/// Timing windows of the process-observation state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Poll period.
    pub tick_secs: u64,
    /// How long a launch may go without a process sighting.
    pub confirm_window_secs: u64,
    /// How long a confirmed session tolerates the process being gone.
    pub stop_after_gone_secs: u64,
    /// Sessions shorter than this are discarded.
    pub min_session_secs: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            tick_secs: 2,
            confirm_window_secs: 120,
            stop_after_gone_secs: 20,
            min_session_secs: 5,
        }
    }
}

impl TrackerSettings {
    /// Poll period as a `Duration`, never zero.
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    /// Confirm window as a `Duration`.
    pub fn confirm_window(&self) -> Duration {
        Duration::from_secs(self.confirm_window_secs)
    }

    /// Stop-after-gone window as a `Duration`.
    pub fn stop_after_gone(&self) -> Duration {
        Duration::from_secs(self.stop_after_gone_secs)
    }

    /// Minimum committed session length as a `Duration`.
    pub fn min_session(&self) -> Duration {
        Duration::from_secs(self.min_session_secs)
    }
}

/// Which hours feed the weighted picker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickerWeighting {
    /// Only Steam API hours count; every other entry weighs as unplayed.
    #[default]
    SteamHours,
    /// API hours or locally tracked hours, whichever is larger, on any platform.
    AnyHours,
}

/// Random picker settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerSettings {
    /// Hours source for weighted picks.
    pub weighting: PickerWeighting,
}

/// Launch history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of retained entries.
    pub max_entries: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_entries: crate::history::MAX_ENTRIES,
        }
    }
}

/// Steam web API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamSettings {
    /// SteamID64 override; otherwise the stored or locally detected id is used.
    pub steam_id64: Option<String>,
    /// Per-request timeout.
    pub http_timeout_secs: u64,
    /// Maximum simultaneous store-tag requests.
    pub tag_import_concurrency: usize,
    /// Report import progress every N completions.
    pub tag_import_progress_every: usize,
}

impl Default for SteamSettings {
    fn default() -> Self {
        Self {
            steam_id64: None,
            http_timeout_secs: 12,
            tag_import_concurrency: 6,
            tag_import_progress_every: 10,
        }
    }
}

impl AppConfig {
    /// Load settings from the default location overlaid by the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load settings from a specific file (which may be absent).
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("library.platforms")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read settings {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("invalid settings in {}", path.display()))
    }

    /// Resolved location of the persisted library store.
    pub fn store_path(&self) -> PathBuf {
        self.library
            .store_path
            .clone()
            .unwrap_or_else(|| data_dir().join("library.json"))
    }
}

/// Default settings file location.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.toml")
}

/// Default data directory for the store and logs.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Write a commented default settings file if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    let path = config_path();
    write_default_config(&path)?;
    Ok(path)
}

fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))
}
