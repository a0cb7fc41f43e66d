//! Merge per-platform scan results into one deterministic library view.

use std::{cmp::Ordering, collections::HashSet};

use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    models::{GameEntry, Platform},
    scanner::{scanner_for, ScanContext},
    store::LibraryStore,
};

/// Concatenate, deduplicate by case-insensitive key (first wins) and sort by
/// name, then platform.
pub fn aggregate(per_platform: impl IntoIterator<Item = Vec<GameEntry>>) -> Vec<GameEntry> {
    let mut seen = HashSet::new();
    let mut merged: Vec<GameEntry> = per_platform
        .into_iter()
        .flatten()
        .filter(|entry| seen.insert(entry.folded_key()))
        .collect();
    merged.sort_by(compare_entries);
    merged
}

fn compare_entries(a: &GameEntry, b: &GameEntry) -> Ordering {
    a.name
        .to_lowercase()
        .cmp(&b.name.to_lowercase())
        .then_with(|| a.platform.cmp(&b.platform))
}

/// Join durable per-key state from the store onto freshly scanned entries.
pub fn apply_store(entries: &mut [GameEntry], store: &LibraryStore) {
    for entry in entries {
        apply_store_to(entry, store);
    }
}

/// Join durable state onto one entry.
pub fn apply_store_to(entry: &mut GameEntry, store: &LibraryStore) {
    let key = entry.key();
    entry.included = store.is_included(&key);
    entry.favorite = store.is_favorite(&key);
    entry.tags = store.tags_for(&key);
    entry.auto_tags = store.auto_tags_for(&key);
    entry.tracked_playtime_hours = store.tracked_hours_for(&key);
    entry.playtime_hours = if entry.supports_playtime {
        store.steam_hours_for(&key)
    } else {
        None
    };
}

/// Run every enabled adapter on a blocking task and aggregate the results.
///
/// An adapter that panics contributes nothing.
pub async fn scan_enabled(ctx: &ScanContext, platforms: &[Platform]) -> Vec<GameEntry> {
    let mut enabled: Vec<Platform> = Vec::new();
    for platform in platforms {
        if !enabled.contains(platform) {
            enabled.push(*platform);
        }
    }

    let tasks = enabled.iter().map(|platform| {
        let platform = *platform;
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || scanner_for(platform).scan(&ctx))
    });

    let mut lists = Vec::with_capacity(enabled.len());
    for (platform, result) in enabled.iter().zip(join_all(tasks).await) {
        match result {
            Ok(list) => lists.push(list),
            Err(err) => warn!("{platform} scan failed: {err}"),
        }
    }

    let merged = aggregate(lists);
    info!("library scan found {} games", merged.len());
    merged
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::scanner::{KnownFolders, NoRegistry};

    #[test]
    fn different_platforms_never_collide() {
        let steam = vec![GameEntry::new(Platform::Steam, "10", "Half-Life")];
        let epic = vec![GameEntry::new(Platform::Epic, "half-life", "Half-Life")];
        let merged = aggregate([steam, epic]);
        let keys: Vec<_> = merged.iter().map(GameEntry::key).collect();
        assert_eq!(keys, vec!["steam:10", "epic:half-life"]);
    }

    #[test]
    fn same_key_collapses_case_insensitively() {
        let first = vec![
            GameEntry::new(Platform::Steam, "440", "Team Fortress 2"),
            GameEntry::new(Platform::Gog, "AbC", "Alpha"),
        ];
        let second = vec![
            GameEntry::new(Platform::Steam, "440", "TF2 (second manifest)"),
            GameEntry::new(Platform::Gog, "abc", "Alpha duplicate"),
        ];
        let merged = aggregate([first, second]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Alpha");
        assert_eq!(merged[1].key(), "steam:440");
        assert_eq!(merged[1].name, "Team Fortress 2");
    }

    #[test]
    fn sorts_by_name_then_platform() {
        let merged = aggregate([vec![
            GameEntry::new(Platform::Ubisoft, "1", "beta"),
            GameEntry::new(Platform::Epic, "2", "Alpha"),
            GameEntry::new(Platform::Steam, "3", "Beta"),
        ]]);
        let order: Vec<_> = merged.iter().map(GameEntry::key).collect();
        assert_eq!(order, vec!["epic:2", "steam:3", "ubisoft:1"]);
    }

    #[test]
    fn store_state_is_joined_by_key() {
        let mut store = LibraryStore::default();
        store.set_favorite("STEAM:440", true);
        store.set_included("epic:fn", false);
        store.set_tags("steam:440", &["Shooter"]);
        store.add_tracked_seconds("epic:fn", 5400);
        store.steam_playtime_hours.insert("steam:440".into(), 12.5);
        store.steam_playtime_hours.insert("epic:fn".into(), 99.0);

        let mut entries = vec![
            GameEntry::new(Platform::Steam, "440", "Team Fortress 2"),
            GameEntry::new(Platform::Epic, "fn", "Fortnite"),
        ];
        let before = store.clone();
        apply_store(&mut entries, &store);
        assert_eq!(store, before);

        assert!(entries[0].favorite);
        assert_eq!(entries[0].tags, vec!["shooter"]);
        assert_eq!(entries[0].playtime_hours, Some(12.5));
        assert!(!entries[1].included);
        assert_eq!(entries[1].tracked_playtime_hours, Some(1.5));
        assert_eq!(entries[1].playtime_hours, None);
    }

    #[tokio::test]
    async fn scanning_an_empty_host_finds_nothing() -> Result<()> {
        let temp = tempdir()?;
        let ctx = ScanContext::new(KnownFolders::rooted_at(temp.path()), Arc::new(NoRegistry));
        let games = scan_enabled(&ctx, &Platform::ALL).await;
        assert!(games.is_empty());
        Ok(())
    }
}
