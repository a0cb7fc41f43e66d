//! Per-platform library scanners.
//!
//! Each adapter reads one storefront's on-disk or registry records and turns
//! them into [`GameEntry`] candidates. Scans never fail: unreadable sources and
//! malformed records are logged and skipped.

mod amazon;
mod epic;
mod folders;
mod gog;
pub mod registry;
mod riot;
mod steam;
mod ubisoft;
mod xbox;

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;
use walkdir::WalkDir;

pub use amazon::AmazonScanner;
pub use epic::EpicScanner;
pub use folders::KnownFolders;
pub use gog::GogScanner;
#[cfg(test)]
pub(crate) use registry::testing::MemoryRegistry;
pub use registry::{Hive, NoRegistry, RegistryReader, View};
pub use riot::RiotScanner;
pub use steam::{steam_root, SteamScanner};
pub use ubisoft::UbisoftScanner;
pub use xbox::XboxScanner;

use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

/// Everything an adapter may read from the host.
#[derive(Clone)]
pub struct ScanContext {
    /// Well-known directories.
    pub folders: KnownFolders,
    /// Registry access.
    pub registry: Arc<dyn RegistryReader>,
}

impl ScanContext {
    /// Context over explicit folders and registry.
    pub fn new(folders: KnownFolders, registry: Arc<dyn RegistryReader>) -> Self {
        Self { folders, registry }
    }

    /// Context over the running host.
    pub fn system() -> Self {
        Self::new(KnownFolders::from_env(), registry::system_registry())
    }
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("folders", &self.folders)
            .finish_non_exhaustive()
    }
}

/// One platform's discovery and launch mechanics.
pub trait Scanner: Send + Sync {
    /// Platform this adapter serves.
    fn platform(&self) -> Platform;

    /// Installed games, deduplicated by key.
    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry>;

    /// How to start the game with the given platform id.
    fn resolve_launch_target(&self, id: &str, ctx: &ScanContext)
        -> Result<LaunchTarget, LaunchError>;
}

/// Adapter for a platform.
pub fn scanner_for(platform: Platform) -> &'static dyn Scanner {
    match platform {
        Platform::Steam => &SteamScanner,
        Platform::Epic => &EpicScanner,
        Platform::Gog => &GogScanner,
        Platform::Riot => &RiotScanner,
        Platform::Amazon => &AmazonScanner,
        Platform::Xbox => &XboxScanner,
        Platform::Ubisoft => &UbisoftScanner,
    }
}

/// Keep the first entry for every case-insensitive key.
pub(crate) fn dedup_by_key(entries: Vec<GameEntry>) -> Vec<GameEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.folded_key()))
        .collect()
}

/// Files directly inside `dir` whose extension matches (case-insensitive),
/// sorted by path.
pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("skipping unreadable entry in {}: {err}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    files
}

/// Read a text file, logging and swallowing failures.
pub(crate) fn read_text(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            debug!("failed to read {}: {err}", path.display());
            None
        }
    }
}

/// String member of a JSON object, tried in priority order.
pub(crate) fn json_str<'a>(value: &'a serde_json::Value, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        value
            .get(*name)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    })
}

/// Boolean member of a JSON object; anything but `true`/`false` yields `None`.
pub(crate) fn json_bool(value: &serde_json::Value, name: &str) -> Option<bool> {
    value.get(name).and_then(serde_json::Value::as_bool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_platform_has_a_scanner() {
        for platform in Platform::ALL {
            assert_eq!(scanner_for(platform).platform(), platform);
        }
    }

    #[test]
    fn dedup_keeps_first_case_insensitively() {
        let entries = vec![
            GameEntry::new(Platform::Gog, "ABC", "First"),
            GameEntry::new(Platform::Gog, "abc", "Second"),
            GameEntry::new(Platform::Epic, "abc", "Other platform"),
        ];
        let deduped = dedup_by_key(entries);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "First");
    }

    #[test]
    fn json_lookup_tries_names_in_order() {
        let value = serde_json::json!({ "productId": "  ", "asin": "B01", "installed": "yes" });
        assert_eq!(json_str(&value, &["id", "productId", "asin"]), Some("B01"));
        assert_eq!(json_bool(&value, "installed"), None);
    }
}
