//! Tag normalization and tag/name filters.

use std::collections::BTreeSet;

use crate::models::GameEntry;

const SEPARATORS: [char; 5] = [',', ';', '\t', '\r', '\n'];

/// Split free-form tag text into sorted, unique, lowercase tags.
///
/// Leading `#` characters are stripped so `#RPG` and `rpg` collapse.
pub fn normalize(raw: &str) -> Vec<String> {
    raw.split(SEPARATORS)
        .map(str::trim)
        .map(|part| part.trim_start_matches('#').trim())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Normalize an already-split list of tags.
pub fn normalize_list<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let joined = tags.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(",");
    normalize(&joined)
}

/// Normalized union of manual and imported tags.
pub fn effective_tags(tags: &[String], auto_tags: &[String]) -> Vec<String> {
    let mut all = Vec::with_capacity(tags.len() + auto_tags.len());
    all.extend(tags.iter().map(String::as_str));
    all.extend(auto_tags.iter().map(String::as_str));
    normalize_list(&all)
}

/// Every effective tag across a set of entries, sorted.
pub fn known_tags<'a>(entries: impl IntoIterator<Item = &'a GameEntry>) -> Vec<String> {
    entries
        .into_iter()
        .flat_map(GameEntry::effective_tags)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Tag constraint applied before a random pick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    /// Normalized filter tags; empty matches everything.
    pub tags: Vec<String>,
    /// Require every tag instead of any one.
    pub match_all: bool,
}

impl TagFilter {
    /// Build a filter, normalizing the tags.
    pub fn new<S: AsRef<str>>(tags: &[S], match_all: bool) -> Self {
        Self {
            tags: normalize_list(tags),
            match_all,
        }
    }

    /// Whether the entry's effective tags satisfy the filter.
    pub fn matches(&self, entry: &GameEntry) -> bool {
        if self.tags.is_empty() {
            return true;
        }
        let effective = entry.effective_tags();
        let has = |tag: &String| effective.binary_search(tag).is_ok();
        if self.match_all {
            self.tags.iter().all(has)
        } else {
            self.tags.iter().any(has)
        }
    }

    /// Comma-joined tags, as recorded in launch history.
    pub fn to_csv(&self) -> String {
        self.tags.join(",")
    }
}

/// Full pool filter: favourites, name search and tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameFilter {
    /// Only favourites qualify.
    pub favorites_only: bool,
    /// Case-insensitive substring of the display name.
    pub search: String,
    /// Tag constraint.
    pub tags: TagFilter,
}

impl GameFilter {
    /// Whether the entry passes every constraint.
    pub fn matches(&self, entry: &GameEntry) -> bool {
        if self.favorites_only && !entry.favorite {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        if !needle.is_empty() && !entry.name.to_lowercase().contains(&needle) {
            return false;
        }
        self.tags.matches(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    #[test]
    fn normalize_splits_trims_and_sorts() {
        assert_eq!(
            normalize(" #RPG ;co-op\tIndie\n\nrpg,"),
            vec!["co-op", "indie", "rpg"]
        );
        assert!(normalize("  , ;# ").is_empty());
    }

    #[test]
    fn normalize_is_idempotent_and_order_insensitive() {
        let once = normalize("B,a,a");
        assert_eq!(once, vec!["a", "b"]);
        assert_eq!(normalize(&once.join(",")), once);
        assert_eq!(normalize("a, B"), once);
    }

    #[test]
    fn effective_tags_merge_sources() {
        let mut game = GameEntry::new(Platform::Steam, "620", "Portal 2");
        game.tags = vec!["Puzzle".into(), "coop".into()];
        game.auto_tags = vec!["puzzle".into(), "#Sci-fi".into()];
        assert_eq!(game.effective_tags(), vec!["coop", "puzzle", "sci-fi"]);
    }

    #[test]
    fn tag_filter_any_and_all() {
        let mut game = GameEntry::new(Platform::Gog, "1", "Witcher");
        game.tags = vec!["rpg".into(), "open world".into()];

        assert!(TagFilter::default().matches(&game));
        assert!(TagFilter::new(&["RPG", "shooter"], false).matches(&game));
        assert!(!TagFilter::new(&["rpg", "shooter"], true).matches(&game));
        assert!(TagFilter::new(&["rpg", "Open World"], true).matches(&game));
    }

    #[test]
    fn game_filter_applies_favorites_and_search() {
        let mut game = GameEntry::new(Platform::Epic, "fn", "Fortnite");
        let filter = GameFilter {
            favorites_only: true,
            ..GameFilter::default()
        };
        assert!(!filter.matches(&game));
        game.favorite = true;
        assert!(filter.matches(&game));

        let search = GameFilter {
            search: "NITE".into(),
            ..GameFilter::default()
        };
        assert!(search.matches(&game));
    }
}
