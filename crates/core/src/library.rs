//! The owner-side context that ties scanning, state, picking and tracking
//! together.
//!
//! A single [`Library`] is owned by the host task. It holds the settings, the
//! persisted store, the scanned entries and the current status line, and it
//! saves the store after every mutation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use crate::{
    aggregate::{apply_store, apply_store_to, scan_enabled},
    config::AppConfig,
    history::LaunchHistoryEntry,
    launcher::Launcher,
    models::{fold_key, game_key, GameEntry, Platform},
    picker,
    scanner::{scanner_for, ScanContext},
    secret::SecretProtector,
    steam::{self, HttpGet, TagImportProgress},
    store::LibraryStore,
    tags::{GameFilter, TagFilter},
    tracker::{PollTick, SessionCommit, SessionTracker, TickOutcome},
};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryEvent {
    /// Tracked time was committed for a session.
    SessionCommitted(SessionCommit),
    /// An entry's display fields changed.
    GameUpdated(GameEntry),
    /// The status line changed.
    Status(String),
}

/// A random pick and the history entry recorded for it.
#[derive(Debug, Clone)]
pub struct PickedGame {
    /// The chosen entry.
    pub entry: GameEntry,
    /// History entry; `launched` is false and `error` set when launching failed.
    pub history: LaunchHistoryEntry,
}

/// Settings, persisted state and scanned entries of one running host.
pub struct Library {
    settings: AppConfig,
    store: LibraryStore,
    store_path: PathBuf,
    ctx: ScanContext,
    entries: Vec<GameEntry>,
    status: String,
    events: Option<mpsc::Sender<LibraryEvent>>,
}

impl Library {
    /// Load the store named by `settings`.
    pub fn open(settings: AppConfig, ctx: ScanContext) -> Result<Self> {
        let store_path = settings.store_path();
        let store = LibraryStore::load(&store_path)?;
        Ok(Self::new(settings, store, store_path, ctx))
    }

    /// Wrap an already loaded store.
    pub fn new(
        settings: AppConfig,
        mut store: LibraryStore,
        store_path: PathBuf,
        ctx: ScanContext,
    ) -> Self {
        store.history.set_max_entries(settings.history.max_entries);
        Self {
            settings,
            store,
            store_path,
            ctx,
            entries: Vec::new(),
            status: String::new(),
            events: None,
        }
    }

    /// Forward [`LibraryEvent`]s into `sender`.
    pub fn with_events(mut self, sender: mpsc::Sender<LibraryEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Application settings.
    pub fn settings(&self) -> &AppConfig {
        &self.settings
    }

    /// Persisted state.
    pub fn store(&self) -> &LibraryStore {
        &self.store
    }

    /// Where the store is saved.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Host filesystem and registry context used for scans and launches.
    pub fn scan_context(&self) -> &ScanContext {
        &self.ctx
    }

    /// Current entries, sorted by name then platform.
    pub fn entries(&self) -> &[GameEntry] {
        &self.entries
    }

    /// Entry by canonical key (case-insensitive).
    pub fn entry(&self, key: &str) -> Option<&GameEntry> {
        let folded = fold_key(key);
        self.entries.iter().find(|entry| entry.folded_key() == folded)
    }

    /// Current status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Write the store to disk.
    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.store_path)
            .with_context(|| format!("failed to save library {}", self.store_path.display()))
    }

    /// Scan every enabled platform and replace the entries.
    pub async fn refresh(&mut self) -> &[GameEntry] {
        self.set_status("Scanning installed games...");
        let scanned = scan_enabled(&self.ctx, &self.settings.library.platforms).await;
        self.set_entries(scanned);
        &self.entries
    }

    /// Replace the entries with an aggregated list, joining stored state.
    pub fn set_entries(&mut self, mut entries: Vec<GameEntry>) {
        apply_store(&mut entries, &self.store);
        self.entries = entries;
        self.set_status(format!("Loaded {} games", self.entries.len()));
    }

    /// Mark or unmark a favourite.
    pub fn set_favorite(&mut self, key: &str, favorite: bool) -> Result<Option<GameEntry>> {
        self.store.set_favorite(key, favorite);
        self.persist_entry(key)
    }

    /// Include or exclude an entry from random picks.
    pub fn set_included(&mut self, key: &str, included: bool) -> Result<Option<GameEntry>> {
        self.store.set_included(key, included);
        self.persist_entry(key)
    }

    /// Replace the user tags of an entry.
    pub fn set_tags<S: AsRef<str>>(&mut self, key: &str, tags: &[S]) -> Result<Option<GameEntry>> {
        self.store.set_tags(key, tags);
        self.persist_entry(key)
    }

    /// Replace the imported tags of an entry.
    pub fn set_auto_tags<S: AsRef<str>>(
        &mut self,
        key: &str,
        tags: &[S],
    ) -> Result<Option<GameEntry>> {
        self.store.set_auto_tags(key, tags);
        self.persist_entry(key)
    }

    /// Favourite and tag constraints remembered from the last pick.
    pub fn saved_filter(&self) -> GameFilter {
        let preferences = &self.store.preferences;
        GameFilter {
            favorites_only: preferences.favorites_only,
            search: String::new(),
            tags: TagFilter::new(preferences.filter_tags.as_slice(), preferences.match_all_tags),
        }
    }

    /// Included entries that pass `filter`.
    pub fn pool(&self, filter: &GameFilter) -> Vec<GameEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.included && filter.matches(entry))
            .cloned()
            .collect()
    }

    /// Pick from the filtered pool, launch it and record the attempt.
    ///
    /// The filter and weighting are saved as preferences either way. Returns
    /// `None` when the pool is empty. A failed launch is still recorded, with
    /// the error on the history entry.
    pub fn launch_random<R: Rng + ?Sized>(
        &mut self,
        filter: &GameFilter,
        weighted: bool,
        rng: &mut R,
        launcher: &dyn Launcher,
        now: DateTime<Utc>,
    ) -> Result<Option<PickedGame>> {
        let preferences = &mut self.store.preferences;
        preferences.favorites_only = filter.favorites_only;
        preferences.filter_tags = filter.tags.tags.clone();
        preferences.match_all_tags = filter.tags.match_all;
        preferences.use_playtime_weighting = weighted;

        let pool = self.pool(filter);
        let weighting = self.settings.picker.weighting;
        let Some(entry) = picker::pick(&pool, weighted, weighting, rng).cloned() else {
            self.set_status("No games available (check Included/Favorites settings)");
            self.save()?;
            return Ok(None);
        };

        self.set_status(format!("Launching: {} ({})", entry.name, entry.platform));
        let launched = scanner_for(entry.platform)
            .resolve_launch_target(&entry.id, &self.ctx)
            .and_then(|target| launcher.launch(&target));
        let error = match &launched {
            Ok(()) => String::new(),
            Err(err) => {
                warn!("launch of {} failed: {err}", entry.key());
                self.set_status(err.to_string());
                err.to_string()
            }
        };

        let history = self.store.history.add_launch(
            &entry,
            &filter.tags.tags,
            filter.tags.match_all,
            launched.is_ok(),
            &error,
            now,
        );
        self.save()?;
        Ok(Some(PickedGame { entry, history }))
    }

    /// Record a committed session on its history entry and refresh the
    /// entry's tracked hours.
    pub fn apply_session_commit(&mut self, commit: &SessionCommit) -> Result<()> {
        if let Some(id) = commit.history_id {
            if !self.store.history.update_session(id, commit.seconds_added) {
                info!("history entry {id} was evicted before its session ended");
            }
        }
        self.save()?;
        self.emit(LibraryEvent::SessionCommitted(commit.clone()));
        self.refresh_entry(&commit.game_key);
        Ok(())
    }

    /// Start tracking a picked game.
    pub fn start_tracking(
        &mut self,
        tracker: &mut SessionTracker,
        picked: &PickedGame,
        now: DateTime<Utc>,
    ) {
        if picked.history.launched {
            tracker.start(&picked.entry, Some(picked.history.id), now);
        }
    }

    /// Feed a poll tick to the tracker, committing and saving when a session
    /// finishes.
    pub fn handle_tick(
        &mut self,
        tracker: &mut SessionTracker,
        tick: PollTick,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome> {
        let outcome = tracker.on_tick(tick, now, &mut self.store);
        if let Some(status) = outcome.status_text() {
            self.set_status(status);
        }
        if let TickOutcome::Finished {
            commit: Some(commit),
            ..
        } = &outcome
        {
            self.apply_session_commit(commit)?;
        }
        Ok(outcome)
    }

    /// Stop the tracker, committing a confirmed session when `commit` is set.
    pub fn stop_tracking(
        &mut self,
        tracker: &mut SessionTracker,
        commit: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionCommit>> {
        let committed = tracker.stop(commit, now, &mut self.store);
        match &committed {
            Some(commit) => self.apply_session_commit(commit)?,
            None => self.save()?,
        }
        Ok(committed)
    }

    /// Drop every history entry.
    pub fn clear_history(&mut self) -> Result<()> {
        self.store.history.clear();
        self.save()?;
        self.set_status("History cleared");
        Ok(())
    }

    /// Protect and store the Steam web API key.
    pub fn set_steam_api_key(&mut self, plain: &str, protector: &dyn SecretProtector) -> Result<()> {
        self.store.steam_api_key_protected = protector
            .protect(plain)
            .context("failed to protect Steam API key")?;
        self.save()?;
        self.set_status("API key saved");
        Ok(())
    }

    /// Store the SteamID64 used for the owned-games API.
    pub fn set_steam_id64(&mut self, steam_id64: &str) -> Result<()> {
        self.store.steam_id64 = steam_id64.trim().to_string();
        self.save()
    }

    /// SteamID64 from settings, the store, or the local Steam client, in
    /// that order. A locally detected id is remembered in the store.
    pub fn resolve_steam_id64(&mut self) -> Option<String> {
        let configured = self
            .settings
            .steam
            .steam_id64
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        if configured.is_some() {
            return configured;
        }
        if !self.store.steam_id64.trim().is_empty() {
            return Some(self.store.steam_id64.trim().to_string());
        }
        let detected = steam::detect_local_steam_id64(&self.ctx)?;
        info!("using local Steam account {detected}");
        self.store.steam_id64 = detected.clone();
        Some(detected)
    }

    /// Replace Steam hours with the owned-games API's numbers.
    ///
    /// Returns how many games reported hours. Missing credentials are a
    /// status message, not an error.
    pub async fn fetch_steam_playtime<H: HttpGet>(
        &mut self,
        http: &H,
        protector: &dyn SecretProtector,
    ) -> Result<usize> {
        let api_key = protector
            .unprotect(&self.store.steam_api_key_protected)
            .unwrap_or_else(|err| {
                warn!("stored Steam API key is unreadable: {err:#}");
                String::new()
            });
        let steam_id64 = self.resolve_steam_id64().unwrap_or_default();
        if api_key.trim().is_empty() || steam_id64.is_empty() {
            self.set_status("Enter SteamID64 and API key, then Save");
            return Ok(0);
        }

        self.set_status("Fetching Steam playtime...");
        let hours = match steam::owned_playtime_hours(http, &api_key, &steam_id64).await {
            Ok(hours) => hours,
            Err(err) => {
                self.set_status(format!("{err:#}"));
                return Err(err);
            }
        };

        self.store.steam_playtime_hours = hours
            .iter()
            .map(|(app_id, hours)| (fold_key(&game_key(Platform::Steam, app_id)), *hours))
            .collect();
        apply_store(&mut self.entries, &self.store);
        self.save()?;
        self.set_status("Steam playtime updated");
        Ok(hours.len())
    }

    /// Import store genres and tags as auto tags for every Steam entry.
    ///
    /// Returns how many entries received tags.
    pub async fn import_store_tags<H, F>(&mut self, http: &H, on_progress: F) -> Result<usize>
    where
        H: HttpGet,
        F: Fn(TagImportProgress) + Sync,
    {
        self.set_status("Importing Steam store tags...");
        let imported = steam::import_store_tags(
            http,
            &self.entries,
            self.settings.steam.tag_import_concurrency,
            self.settings.steam.tag_import_progress_every,
            on_progress,
        )
        .await;

        for (key, tags) in &imported {
            self.store.set_auto_tags(key, tags.as_slice());
        }
        apply_store(&mut self.entries, &self.store);
        self.save()?;
        self.set_status(format!("Imported tags for {} games", imported.len()));
        Ok(imported.len())
    }

    fn persist_entry(&mut self, key: &str) -> Result<Option<GameEntry>> {
        self.save()?;
        Ok(self.refresh_entry(key))
    }

    fn refresh_entry(&mut self, key: &str) -> Option<GameEntry> {
        let folded = fold_key(key);
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.folded_key() == folded)?;
        apply_store_to(entry, &self.store);
        let updated = entry.clone();
        self.emit(LibraryEvent::GameUpdated(updated.clone()));
        Some(updated)
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        info!("{}", self.status);
        self.emit(LibraryEvent::Status(self.status.clone()));
    }

    fn emit(&self, event: LibraryEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => warn!("library event dropped: {event:?}"),
        }
    }
}
