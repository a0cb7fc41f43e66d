//! Append-only launch history ledger.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{models::GameEntry, store::seconds_to_hours};

/// Default maximum number of retained history entries.
pub const MAX_ENTRIES: usize = 1000;

/// One launch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchHistoryEntry {
    /// Opaque unique handle.
    pub id: Uuid,
    /// When the launch was attempted.
    pub timestamp: DateTime<Utc>,
    /// Canonical key of the launched game.
    pub game_key: String,
    /// Display name at launch time.
    pub name: String,
    /// Platform tag.
    pub platform: String,
    /// Whether the OS accepted the launch.
    pub launched: bool,
    /// Error message, empty on success.
    #[serde(default)]
    pub error: String,
    /// Tag filter active for the pick.
    #[serde(default)]
    pub filter_tags_csv: String,
    /// Whether the tag filter required every tag.
    #[serde(default)]
    pub match_all_tags: bool,
    /// Seconds recorded by the session tracker.
    #[serde(default)]
    pub session_seconds: u64,
}

/// Bounded, insertion-ordered history of launch attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryLedger {
    #[serde(default)]
    entries: Vec<LaunchHistoryEntry>,
    #[serde(skip, default = "default_max_entries")]
    max_entries: usize,
}

fn default_max_entries() -> usize {
    MAX_ENTRIES
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::with_max_entries(MAX_ENTRIES)
    }
}

impl HistoryLedger {
    /// Empty ledger retaining at most `max_entries` entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Change the retention limit, trimming immediately.
    pub fn set_max_entries(&mut self, max_entries: usize) {
        self.max_entries = max_entries.max(1);
        self.trim();
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> &[LaunchHistoryEntry] {
        &self.entries
    }

    /// Entries sorted newest first.
    pub fn entries_newest_first(&self) -> Vec<&LaunchHistoryEntry> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sorted
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by id.
    pub fn get(&self, id: Uuid) -> Option<&LaunchHistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Append a launch attempt and evict the oldest entries beyond the limit.
    pub fn add_launch(
        &mut self,
        game: &GameEntry,
        filter_tags: &[String],
        match_all: bool,
        launched: bool,
        error: &str,
        now: DateTime<Utc>,
    ) -> LaunchHistoryEntry {
        let entry = LaunchHistoryEntry {
            id: Uuid::new_v4(),
            timestamp: now,
            game_key: game.key(),
            name: game.name.clone(),
            platform: game.platform.as_str().to_string(),
            launched,
            error: error.to_string(),
            filter_tags_csv: filter_tags.join(","),
            match_all_tags: match_all,
            session_seconds: 0,
        };
        self.entries.push(entry.clone());
        self.trim();
        entry
    }

    /// Record a session length; never decreases an existing value.
    ///
    /// Returns `false` when the entry has already been evicted.
    pub fn update_session(&mut self, id: Uuid, seconds: u64) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.session_seconds = entry.session_seconds.max(seconds);
                true
            }
            None => false,
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn trim(&mut self) {
        let overflow = self.entries.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            self.entries.drain(..overflow);
        }
    }
}

/// Aggregate statistics over the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStats {
    /// Retained launch attempts.
    pub total: usize,
    /// Attempts the OS accepted.
    pub successful: usize,
    /// Attempts within the last seven days.
    pub last_7_days: usize,
    /// Launch counts per platform, most launched first.
    pub by_platform: Vec<(String, usize)>,
    /// Ten most picked games with their latest display name.
    pub top_games: Vec<(String, usize)>,
    /// Total tracked hours across all games.
    pub tracked_hours: f64,
}

impl HistoryStats {
    /// Compute statistics as of `now`.
    pub fn compute(
        ledger: &HistoryLedger,
        tracked_seconds: impl IntoIterator<Item = u64>,
        now: DateTime<Utc>,
    ) -> Self {
        let entries = ledger.entries();
        let since = now - Duration::days(7);

        let mut platforms: HashMap<&str, usize> = HashMap::new();
        let mut games: HashMap<&str, (usize, &LaunchHistoryEntry)> = HashMap::new();
        for entry in entries {
            *platforms.entry(entry.platform.as_str()).or_default() += 1;
            let slot = games.entry(entry.game_key.as_str()).or_insert((0, entry));
            slot.0 += 1;
            if entry.timestamp >= slot.1.timestamp {
                slot.1 = entry;
            }
        }

        let mut by_platform: Vec<(String, usize)> = platforms
            .into_iter()
            .map(|(platform, count)| (platform.to_string(), count))
            .collect();
        by_platform.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut top_games: Vec<(String, usize)> = games
            .into_values()
            .map(|(count, latest)| (latest.name.clone(), count))
            .collect();
        top_games.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.to_lowercase().cmp(&b.0.to_lowercase()))
        });
        top_games.truncate(10);

        let total_seconds = tracked_seconds
            .into_iter()
            .fold(0u64, u64::saturating_add);

        Self {
            total: entries.len(),
            successful: entries.iter().filter(|entry| entry.launched).count(),
            last_7_days: entries.iter().filter(|entry| entry.timestamp >= since).count(),
            by_platform,
            top_games,
            tracked_hours: seconds_to_hours(total_seconds),
        }
    }
}

impl fmt::Display for HistoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total launches: {}", self.total)?;
        writeln!(f, "Successful launches: {}", self.successful)?;
        writeln!(f, "Last 7 days: {}", self.last_7_days)?;
        writeln!(f)?;
        writeln!(f, "By platform:")?;
        for (platform, count) in &self.by_platform {
            writeln!(f, "- {platform}: {count}")?;
        }
        writeln!(f)?;
        writeln!(f, "Top games (by random picks):")?;
        for (name, count) in &self.top_games {
            writeln!(f, "- {name}: {count}")?;
        }
        writeln!(f)?;
        write!(
            f,
            "Tracked playtime (launched via gamedice): {:.1} hrs",
            self.tracked_hours
        )
    }
}

/// Render a UTC timestamp as local `YYYY-MM-DD HH:MM`.
pub fn format_local(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Platform;

    fn game(id: &str, name: &str) -> GameEntry {
        GameEntry::new(Platform::Steam, id, name)
    }

    #[test]
    fn add_launch_starts_with_zero_session() {
        let mut ledger = HistoryLedger::default();
        let entry = ledger.add_launch(
            &game("440", "Team Fortress 2"),
            &["shooter".to_string(), "coop".to_string()],
            true,
            false,
            "no handler",
            Utc::now(),
        );
        assert_eq!(entry.game_key, "steam:440");
        assert_eq!(entry.filter_tags_csv, "shooter,coop");
        assert!(entry.match_all_tags);
        assert!(!entry.launched);
        assert_eq!(entry.error, "no handler");
        assert_eq!(entry.session_seconds, 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn trimming_keeps_newest_in_order() {
        let mut ledger = HistoryLedger::with_max_entries(1000);
        let start = Utc::now();
        let mut ids = Vec::new();
        for index in 0..1005 {
            let entry = ledger.add_launch(
                &game(&index.to_string(), "Game"),
                &[],
                false,
                true,
                "",
                start + Duration::seconds(index),
            );
            ids.push(entry.id);
        }

        assert_eq!(ledger.len(), 1000);
        let kept: Vec<Uuid> = ledger.entries().iter().map(|entry| entry.id).collect();
        assert_eq!(kept, ids[5..].to_vec());
        assert_eq!(ledger.entries()[0].game_key, "steam:5");
    }

    #[test]
    fn update_session_is_monotonic() {
        let mut ledger = HistoryLedger::default();
        let entry = ledger.add_launch(&game("1", "A"), &[], false, true, "", Utc::now());

        assert!(ledger.update_session(entry.id, 30));
        assert!(ledger.update_session(entry.id, 20));
        assert_eq!(ledger.get(entry.id).map(|e| e.session_seconds), Some(30));
        assert!(!ledger.update_session(Uuid::new_v4(), 10));
    }

    #[test]
    fn stats_summarize_history() {
        let mut ledger = HistoryLedger::default();
        let now = Utc::now();
        ledger.add_launch(&game("1", "Alpha"), &[], false, true, "", now - Duration::days(30));
        ledger.add_launch(&game("1", "Alpha Remastered"), &[], false, true, "", now);
        ledger.add_launch(
            &GameEntry::new(Platform::Epic, "b", "Beta"),
            &[],
            false,
            false,
            "failed",
            now,
        );

        let stats = HistoryStats::compute(&ledger, [1800, 1800], now);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.last_7_days, 2);
        assert_eq!(stats.by_platform[0], ("steam".to_string(), 2));
        assert_eq!(stats.top_games[0], ("Alpha Remastered".to_string(), 2));
        assert_eq!(stats.tracked_hours, 1.0);

        let text = stats.to_string();
        assert!(text.starts_with("Total launches: 3"));
        assert!(text.contains("- epic: 1"));
        assert!(text.ends_with("1.0 hrs"));
    }

    #[test]
    fn newest_first_ordering() {
        let mut ledger = HistoryLedger::default();
        let now = Utc::now();
        ledger.add_launch(&game("1", "Old"), &[], false, true, "", now - Duration::hours(1));
        ledger.add_launch(&game("2", "New"), &[], false, true, "", now);
        let names: Vec<_> = ledger
            .entries_newest_first()
            .into_iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["New", "Old"]);
    }
}
