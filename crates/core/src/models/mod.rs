//! Shared domain models.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::tags;

/// Storefronts and launchers whose installs can be discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Valve Steam.
    Steam,
    /// Epic Games Launcher.
    Epic,
    /// GOG Galaxy / standalone GOG installers.
    Gog,
    /// Riot Client titles.
    Riot,
    /// Amazon Games.
    Amazon,
    /// Xbox app / Gaming Services titles.
    Xbox,
    /// Ubisoft Connect.
    Ubisoft,
}

impl Platform {
    /// Every supported platform, in canonical order.
    pub const ALL: [Platform; 7] = [
        Platform::Steam,
        Platform::Epic,
        Platform::Gog,
        Platform::Riot,
        Platform::Amazon,
        Platform::Xbox,
        Platform::Ubisoft,
    ];

    /// Lowercase tag used in keys and persisted state.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Steam => "steam",
            Platform::Epic => "epic",
            Platform::Gog => "gog",
            Platform::Riot => "riot",
            Platform::Amazon => "amazon",
            Platform::Xbox => "xbox",
            Platform::Ubisoft => "ubisoft",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| anyhow::anyhow!("unknown platform '{value}'"))
    }
}

/// Build the canonical `platform:id` key.
pub fn game_key(platform: Platform, id: &str) -> String {
    format!("{}:{}", platform.as_str(), id)
}

/// Fold a key for case-insensitive comparison and map lookups.
pub fn fold_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// A single installed game as seen by one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEntry {
    /// Platform the entry was discovered on.
    pub platform: Platform,
    /// Platform-native identifier (app id, package family name, GUID, ...).
    pub id: String,
    /// Best-effort display name.
    pub name: String,
    /// Install directory, when the platform exposes one.
    pub install_path: Option<PathBuf>,
    /// Whether the platform API can report hours played.
    pub supports_playtime: bool,
    /// User toggle: eligible for random picks.
    pub included: bool,
    /// User toggle: favourite.
    pub favorite: bool,
    /// Hours reported by the platform API.
    pub playtime_hours: Option<f64>,
    /// Hours observed locally by the session tracker.
    pub tracked_playtime_hours: Option<f64>,
    /// User-entered tags.
    pub tags: Vec<String>,
    /// Tags imported from store metadata.
    pub auto_tags: Vec<String>,
}

impl GameEntry {
    /// Fresh scan result with all user state at its defaults.
    pub fn new(platform: Platform, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
            name: name.into(),
            install_path: None,
            supports_playtime: platform == Platform::Steam,
            included: true,
            favorite: false,
            playtime_hours: None,
            tracked_playtime_hours: None,
            tags: Vec::new(),
            auto_tags: Vec::new(),
        }
    }

    /// Attach an install path; empty paths are treated as unknown.
    pub fn with_install_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.install_path = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        };
        self
    }

    /// Canonical `platform:id` key.
    pub fn key(&self) -> String {
        game_key(self.platform, &self.id)
    }

    /// Lowercase key used for dedup and store lookups.
    pub fn folded_key(&self) -> String {
        fold_key(&self.key())
    }

    /// Hours to show: API-sourced first, then locally tracked.
    pub fn display_hours(&self) -> Option<f64> {
        self.playtime_hours.or(self.tracked_playtime_hours)
    }

    /// Normalized union of manual and imported tags.
    pub fn effective_tags(&self) -> Vec<String> {
        tags::effective_tags(&self.tags, &self.auto_tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespaced_by_platform() {
        let steam = GameEntry::new(Platform::Steam, "10", "Half-Life");
        let epic = GameEntry::new(Platform::Epic, "half-life", "Half-Life");
        assert_eq!(steam.key(), "steam:10");
        assert_eq!(epic.key(), "epic:half-life");
        assert!(steam.supports_playtime);
        assert!(!epic.supports_playtime);
    }

    #[test]
    fn display_hours_prefers_api_value() {
        let mut game = GameEntry::new(Platform::Steam, "440", "Team Fortress 2");
        game.tracked_playtime_hours = Some(2.5);
        assert_eq!(game.display_hours(), Some(2.5));
        game.playtime_hours = Some(100.0);
        assert_eq!(game.display_hours(), Some(100.0));
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("XBOX".parse::<Platform>().unwrap(), Platform::Xbox);
        assert!("origin".parse::<Platform>().is_err());
    }

    #[test]
    fn empty_install_path_is_unknown() {
        let game = GameEntry::new(Platform::Xbox, "pkg_x", "Game").with_install_path("");
        assert!(game.install_path.is_none());
    }
}
