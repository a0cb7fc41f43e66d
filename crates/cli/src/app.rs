use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use gamedice_core::{
    history::{format_local, HistoryStats},
    secret::PlatformProtector,
    steam::{self, ReqwestHttp},
    tags, GameEntry, GameFilter, Library, LibraryEvent, SessionTracker, SystemLauncher,
    SystemProcesses, TagFilter,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;
use tracing::info;

use crate::{Command, FilterArgs, SteamCommand};

pub async fn run(library: Library, command: Command) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel(256);
    let mut session = Session {
        library: library.with_events(event_tx),
        events: event_rx,
    };
    session.dispatch(command).await
}

struct Session {
    library: Library,
    events: mpsc::Receiver<LibraryEvent>,
}

impl Session {
    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::List(filter) => {
                self.refresh().await;
                let filter = game_filter(&filter);
                for entry in self.library.entries().iter().filter(|entry| filter.matches(entry)) {
                    println!("{}", describe(entry));
                }
            }
            Command::Pick {
                filter,
                weighted,
                last,
                no_track,
                seed,
            } => {
                self.refresh().await;
                let (filter, weighted) = if last {
                    let saved = GameFilter {
                        search: filter.search.clone(),
                        ..self.library.saved_filter()
                    };
                    let stored = self.library.store().preferences.use_playtime_weighting;
                    (saved, weighted || stored)
                } else {
                    (game_filter(&filter), weighted)
                };
                self.pick(&filter, weighted, !no_track, seed).await?;
            }
            Command::Favorite { key, off } => {
                self.refresh().await;
                let updated = self.library.set_favorite(&key, !off)?;
                self.report_update(&key, updated);
            }
            Command::Exclude { key } => {
                self.refresh().await;
                let updated = self.library.set_included(&key, false)?;
                self.report_update(&key, updated);
            }
            Command::Include { key } => {
                self.refresh().await;
                let updated = self.library.set_included(&key, true)?;
                self.report_update(&key, updated);
            }
            Command::Tags { key, tags } => {
                self.refresh().await;
                let updated = self.library.set_tags(&key, tags.as_slice())?;
                self.report_update(&key, updated);
            }
            Command::History {
                stats,
                clear,
                limit,
            } => self.history(stats, clear, limit)?,
            Command::Steam(command) => self.steam(command).await?,
        }
        self.drain_events();
        Ok(())
    }

    async fn refresh(&mut self) {
        self.library.refresh().await;
        self.drain_events();
    }

    async fn pick(
        &mut self,
        filter: &GameFilter,
        weighted: bool,
        track: bool,
        seed: Option<u64>,
    ) -> Result<()> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let Some(picked) =
            self.library
                .launch_random(filter, weighted, &mut rng, &SystemLauncher, Utc::now())?
        else {
            self.drain_events();
            return Ok(());
        };
        self.drain_events();
        if !track || !picked.history.launched {
            return Ok(());
        }

        let (tick_tx, mut tick_rx) = mpsc::channel(1);
        let mut tracker = SessionTracker::new(
            self.library.settings().tracker.clone(),
            Box::new(SystemProcesses::new()),
        )
        .with_ticks(tick_tx);
        self.library.start_tracking(&mut tracker, &picked, Utc::now());
        println!("Tracking {}; press Ctrl+C to stop.", picked.entry.name);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        loop {
            tokio::select! {
                maybe_tick = tick_rx.recv() => {
                    let Some(tick) = maybe_tick else { break };
                    let outcome = self.library.handle_tick(&mut tracker, tick, Utc::now())?;
                    self.drain_events();
                    if outcome.is_terminal() {
                        break;
                    }
                }
                _ = &mut ctrl_c => {
                    info!("interrupted; stopping playtime tracking");
                    self.library.stop_tracking(&mut tracker, true, Utc::now())?;
                    break;
                }
            }
        }
        Ok(())
    }

    fn history(&mut self, stats: bool, clear: bool, limit: usize) -> Result<()> {
        if clear {
            return self.library.clear_history();
        }
        let store = self.library.store();
        if stats {
            let stats =
                HistoryStats::compute(&store.history, store.tracked_seconds.values().copied(), Utc::now());
            println!("{stats}");
            return Ok(());
        }
        for entry in store.history.entries_newest_first().into_iter().take(limit) {
            let outcome = if entry.launched {
                "launched".to_string()
            } else {
                format!("failed: {}", entry.error)
            };
            let session = match entry.session_seconds {
                0 => String::new(),
                secs => format!("  {}m", secs / 60),
            };
            println!(
                "{}  {} ({})  {outcome}{session}",
                format_local(entry.timestamp),
                entry.name,
                entry.platform
            );
        }
        Ok(())
    }

    async fn steam(&mut self, command: SteamCommand) -> Result<()> {
        let timeout = Duration::from_secs(self.library.settings().steam.http_timeout_secs);
        match command {
            SteamCommand::SetKey { key } => self.library.set_steam_api_key(&key, &PlatformProtector)?,
            SteamCommand::SetId { steam_id64 } => self.library.set_steam_id64(&steam_id64)?,
            SteamCommand::DetectId => match steam::detect_local_steam_id64(self.library.scan_context()) {
                Some(id) => println!("{id}"),
                None => bail!("no signed-in Steam account found"),
            },
            SteamCommand::Playtime => {
                self.refresh().await;
                let http = ReqwestHttp::new(timeout)?;
                let updated = self
                    .library
                    .fetch_steam_playtime(&http, &PlatformProtector)
                    .await?;
                println!("{updated} games reported playtime");
            }
            SteamCommand::ImportTags => {
                self.refresh().await;
                let http = ReqwestHttp::new(timeout)?;
                let imported = self
                    .library
                    .import_store_tags(&http, |progress| {
                        eprintln!("Importing tags {}/{}", progress.done, progress.total)
                    })
                    .await?;
                println!("{imported} games tagged");
            }
        }
        Ok(())
    }

    fn report_update(&self, key: &str, updated: Option<GameEntry>) {
        match updated {
            Some(entry) => println!("{}", describe(&entry)),
            None => println!("{key} is not installed; setting saved"),
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                LibraryEvent::Status(status) => println!("{status}"),
                LibraryEvent::SessionCommitted(commit) => println!(
                    "+{}m on {} ({:.1} hrs tracked)",
                    commit.seconds_added / 60,
                    commit.name,
                    commit.total_hours()
                ),
                LibraryEvent::GameUpdated(_) => {}
            }
        }
    }
}

fn game_filter(args: &FilterArgs) -> GameFilter {
    let tags = tags::normalize(&args.tags.join(","));
    GameFilter {
        favorites_only: args.favorites,
        search: args.search.clone(),
        tags: TagFilter::new(tags.as_slice(), args.all_tags),
    }
}

fn describe(entry: &GameEntry) -> String {
    let mut line = format!("{:<28} {}", entry.key(), entry.name);
    if entry.favorite {
        line.push_str("  ★");
    }
    if !entry.included {
        line.push_str("  (excluded)");
    }
    if let Some(hours) = entry.display_hours() {
        line.push_str(&format!("  {hours:.1} hrs"));
    }
    let tags = entry.effective_tags();
    if !tags.is_empty() {
        line.push_str(&format!("  [{}]", tags.join(", ")));
    }
    line
}
