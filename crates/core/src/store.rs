//! Persisted per-key library state.
//!
//! Everything a scan cannot re-derive lives here: inclusion and favourite
//! sets, tag maps, tracked seconds, Steam hours, launch history and UI
//! preferences. Keys are always stored folded to lowercase.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::{history::HistoryLedger, models::fold_key, tags};

/// Window placement remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowPlacement {
    /// Left edge, if ever saved.
    pub left: Option<f64>,
    /// Top edge, if ever saved.
    pub top: Option<f64>,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Window state name (`Normal`, `Maximized`, ...).
    pub state: String,
}

impl Default for WindowPlacement {
    fn default() -> Self {
        Self {
            left: None,
            top: None,
            width: 980.0,
            height: 650.0,
            state: "Normal".to_string(),
        }
    }
}

/// Presentation-layer preferences persisted alongside library state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Restrict random picks to favourites.
    pub favorites_only: bool,
    /// Weight picks by playtime.
    pub use_playtime_weighting: bool,
    /// Last tag filter used for a pick.
    pub filter_tags: Vec<String>,
    /// Whether the last tag filter required every tag.
    pub match_all_tags: bool,
    /// Start hidden in the tray.
    pub start_minimized_to_tray: bool,
    /// Hide to tray when minimized.
    pub minimize_to_tray: bool,
    /// Last selected tab.
    pub last_tab_index: u32,
    /// Theme name.
    pub theme: String,
    /// Backdrop name.
    pub backdrop: String,
    /// Main window placement.
    pub window: WindowPlacement,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            favorites_only: false,
            use_playtime_weighting: false,
            filter_tags: Vec::new(),
            match_all_tags: false,
            start_minimized_to_tray: false,
            minimize_to_tray: true,
            last_tab_index: 0,
            theme: "System".to_string(),
            backdrop: "Mica".to_string(),
            window: WindowPlacement::default(),
        }
    }
}

/// Durable library state keyed by folded game key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryStore {
    /// Keys excluded from random picks.
    pub excluded: BTreeSet<String>,
    /// Favourite keys.
    pub favorites: BTreeSet<String>,
    /// User-entered tags.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Tags imported from store metadata.
    pub auto_tags: BTreeMap<String, Vec<String>>,
    /// Seconds observed by the session tracker.
    pub tracked_seconds: BTreeMap<String, u64>,
    /// Hours reported by the Steam owned-games API.
    pub steam_playtime_hours: BTreeMap<String, f64>,
    /// Launch history ledger.
    pub history: HistoryLedger,
    /// UI preferences.
    pub preferences: Preferences,
    /// SteamID64 used for the owned-games API.
    pub steam_id64: String,
    /// Steam web API key, protected by [`crate::secret::SecretProtector`].
    pub steam_api_key_protected: String,
}

impl LibraryStore {
    /// Load the store, returning an empty one when the file does not exist.
    ///
    /// A file that cannot be parsed is renamed to `<name>.corrupt` so a later
    /// save cannot overwrite it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read library store {}", path.display()))?;
        match serde_json::from_str::<Self>(&contents) {
            Ok(mut store) => {
                store.normalize();
                Ok(store)
            }
            Err(err) => {
                let backup = corrupt_path(path);
                warn!(
                    "library store {} is unreadable ({err}); moving it to {}",
                    path.display(),
                    backup.display()
                );
                fs::rename(path, &backup).with_context(|| {
                    format!("failed to move unreadable store to {}", backup.display())
                })?;
                Ok(Self::default())
            }
        }
    }

    /// Atomically write the store, creating parent directories if needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create store directory {}", parent.display()))?;

        let serialized =
            serde_json::to_vec_pretty(self).context("failed to serialize library store")?;
        let mut file = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
        file.write_all(&serialized)
            .context("failed to write library store")?;
        file.persist(path)
            .with_context(|| format!("failed to write library store {}", path.display()))?;
        Ok(())
    }

    /// Re-fold keys written by older or hand-edited files.
    fn normalize(&mut self) {
        self.excluded = std::mem::take(&mut self.excluded)
            .into_iter()
            .map(|key| fold_key(&key))
            .collect();
        self.favorites = std::mem::take(&mut self.favorites)
            .into_iter()
            .map(|key| fold_key(&key))
            .collect();
        self.tags = fold_first(std::mem::take(&mut self.tags));
        self.auto_tags = fold_first(std::mem::take(&mut self.auto_tags));
        self.steam_playtime_hours = fold_first(std::mem::take(&mut self.steam_playtime_hours));

        let mut tracked = BTreeMap::new();
        for (key, seconds) in std::mem::take(&mut self.tracked_seconds) {
            let total: &mut u64 = tracked.entry(fold_key(&key)).or_default();
            *total = total.saturating_add(seconds);
        }
        self.tracked_seconds = tracked;
    }

    /// Whether the key is eligible for random picks.
    pub fn is_included(&self, key: &str) -> bool {
        !self.excluded.contains(&fold_key(key))
    }

    /// Include or exclude a key. Returns the new inclusion state.
    pub fn set_included(&mut self, key: &str, included: bool) -> bool {
        let key = fold_key(key);
        if included {
            self.excluded.remove(&key);
        } else {
            self.excluded.insert(key);
        }
        included
    }

    /// Whether the key is a favourite.
    pub fn is_favorite(&self, key: &str) -> bool {
        self.favorites.contains(&fold_key(key))
    }

    /// Mark or unmark a favourite. Returns the new favourite state.
    pub fn set_favorite(&mut self, key: &str, favorite: bool) -> bool {
        let key = fold_key(key);
        if favorite {
            self.favorites.insert(key);
        } else {
            self.favorites.remove(&key);
        }
        favorite
    }

    /// Normalized manual tags for a key.
    pub fn tags_for(&self, key: &str) -> Vec<String> {
        self.tags
            .get(&fold_key(key))
            .map(|list| tags::normalize_list(list))
            .unwrap_or_default()
    }

    /// Normalized imported tags for a key.
    pub fn auto_tags_for(&self, key: &str) -> Vec<String> {
        self.auto_tags
            .get(&fold_key(key))
            .map(|list| tags::normalize_list(list))
            .unwrap_or_default()
    }

    /// Replace a key's manual tags; an empty list removes the entry.
    pub fn set_tags<S: AsRef<str>>(&mut self, key: &str, tags: &[S]) -> Vec<String> {
        set_tag_map(&mut self.tags, key, tags)
    }

    /// Replace a key's imported tags; an empty list removes the entry.
    pub fn set_auto_tags<S: AsRef<str>>(&mut self, key: &str, tags: &[S]) -> Vec<String> {
        set_tag_map(&mut self.auto_tags, key, tags)
    }

    /// Total tracked seconds for a key.
    pub fn tracked_seconds_for(&self, key: &str) -> u64 {
        self.tracked_seconds
            .get(&fold_key(key))
            .copied()
            .unwrap_or(0)
    }

    /// Add observed seconds to a key's total and return the new total.
    pub fn add_tracked_seconds(&mut self, key: &str, seconds: u64) -> u64 {
        let total = self.tracked_seconds.entry(fold_key(key)).or_default();
        *total = total.saturating_add(seconds);
        *total
    }

    /// Tracked hours rounded to one decimal, if any time was tracked.
    pub fn tracked_hours_for(&self, key: &str) -> Option<f64> {
        match self.tracked_seconds_for(key) {
            0 => None,
            seconds => Some(seconds_to_hours(seconds)),
        }
    }

    /// Steam API hours for a key.
    pub fn steam_hours_for(&self, key: &str) -> Option<f64> {
        self.steam_playtime_hours.get(&fold_key(key)).copied()
    }
}

/// Seconds to hours, rounded to one decimal place.
pub fn seconds_to_hours(seconds: u64) -> f64 {
    (seconds as f64 / 3600.0 * 10.0).round() / 10.0
}

fn set_tag_map<S: AsRef<str>>(
    map: &mut BTreeMap<String, Vec<String>>,
    key: &str,
    tags: &[S],
) -> Vec<String> {
    let key = fold_key(key);
    let normalized = tags::normalize_list(tags);
    if normalized.is_empty() {
        map.remove(&key);
    } else {
        map.insert(key, normalized.clone());
    }
    normalized
}

fn fold_first<V>(map: BTreeMap<String, V>) -> BTreeMap<String, V> {
    let mut folded = BTreeMap::new();
    for (key, value) in map {
        folded.entry(fold_key(&key)).or_insert(value);
    }
    folded
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "library.json".into());
    name.push(".corrupt");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_store_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let store = LibraryStore::load(dir.path().join("library.json"))?;
        assert_eq!(store, LibraryStore::default());
        Ok(())
    }

    #[test]
    fn save_and_reload_preserves_state() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("library.json");

        let mut store = LibraryStore::default();
        store.set_favorite("steam:440", true);
        store.set_included("Epic:Fortnite", false);
        store.set_tags("steam:440", &["Shooter", "#coop"]);
        store.add_tracked_seconds("steam:440", 3600);
        store.save(&path)?;

        let loaded = LibraryStore::load(&path)?;
        assert!(loaded.is_favorite("STEAM:440"));
        assert!(!loaded.is_included("epic:fortnite"));
        assert_eq!(loaded.tags_for("steam:440"), vec!["coop", "shooter"]);
        assert_eq!(loaded.tracked_hours_for("steam:440"), Some(1.0));
        Ok(())
    }

    #[test]
    fn load_folds_keys_and_merges_tracked_seconds() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("library.json");
        fs::write(
            &path,
            r#"{
  "favorites": ["Steam:10"],
  "tracked_seconds": { "Steam:10": 60, "steam:10": 30 },
  "tags": { "GOG:1": ["rpg"] }
}"#,
        )?;

        let store = LibraryStore::load(&path)?;
        assert!(store.favorites.contains("steam:10"));
        assert_eq!(store.tracked_seconds_for("steam:10"), 90);
        assert_eq!(store.tags_for("gog:1"), vec!["rpg"]);
        Ok(())
    }

    #[test]
    fn unreadable_store_is_moved_aside() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("library.json");
        fs::write(&path, "{ not json")?;

        let store = LibraryStore::load(&path)?;
        assert_eq!(store, LibraryStore::default());
        assert!(!path.exists());
        assert!(dir.path().join("library.json.corrupt").exists());
        Ok(())
    }

    #[test]
    fn empty_tag_list_removes_entry() {
        let mut store = LibraryStore::default();
        store.set_tags("steam:1", &["a"]);
        assert!(store.tags.contains_key("steam:1"));
        let result = store.set_tags::<&str>("steam:1", &[]);
        assert!(result.is_empty());
        assert!(!store.tags.contains_key("steam:1"));
        store.set_auto_tags("steam:1", &[" , "]);
        assert!(store.auto_tags.is_empty());
    }

    #[test]
    fn tracked_seconds_only_grow() {
        let mut store = LibraryStore::default();
        assert_eq!(store.add_tracked_seconds("xbox:pkg", 10), 10);
        assert_eq!(store.add_tracked_seconds("XBOX:pkg", 0), 10);
        assert_eq!(store.add_tracked_seconds("xbox:PKG", 5), 15);
        assert_eq!(store.tracked_hours_for("xbox:pkg"), Some(0.0));
        assert_eq!(seconds_to_hours(5400), 1.5);
    }
}
