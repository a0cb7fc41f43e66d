//! Process-observation state machine that infers play sessions.
//!
//! A session starts when a game is launched and waits for any process whose
//! executable lives under the game's install directory. The first sighting
//! confirms the session; once the process has been gone long enough the
//! elapsed time since launch is committed to the store's tracked seconds.

mod process;
mod schedule;

use std::{path::PathBuf, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{config::TrackerSettings, models::GameEntry, store::LibraryStore};

pub use process::{ProcessSource, SystemProcesses};
pub use schedule::{PollSchedule, PollTick};

/// Where the tracker is in a session's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No session.
    Idle,
    /// Launched, no process sighted yet.
    WaitingConfirm,
    /// A process under the install path has been seen.
    Tracking,
}

/// Why an unconfirmed session was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The entry has no install path or the directory is gone.
    InstallPathMissing,
    /// No process appeared under the install path in time.
    ProcessNotDetected,
}

/// Time added to a game by a finished session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCommit {
    /// History entry the session belongs to.
    pub history_id: Option<Uuid>,
    /// Canonical key of the game.
    pub game_key: String,
    /// Display name at launch.
    pub name: String,
    /// Seconds added by this session.
    pub seconds_added: u64,
    /// Tracked seconds for the game after the commit.
    pub total_seconds: u64,
}

impl SessionCommit {
    /// Total tracked hours rounded to one decimal.
    pub fn total_hours(&self) -> f64 {
        crate::store::seconds_to_hours(self.total_seconds)
    }
}

/// Result of one poll.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No session, or the tick belonged to an earlier session.
    Ignored,
    /// Still waiting for the first sighting.
    Waiting,
    /// First sighting of the game's process.
    Confirmed {
        /// Game name.
        name: String,
    },
    /// Confirmed session still running.
    Running,
    /// Session abandoned without committing.
    GaveUp {
        /// Game name.
        name: String,
        /// What went wrong.
        reason: GiveUpReason,
    },
    /// Confirmed session ended.
    Finished {
        /// Game name.
        name: String,
        /// Committed time, `None` if the session was too short.
        commit: Option<SessionCommit>,
    },
}

impl TickOutcome {
    /// Status line for the presentation layer, if this outcome warrants one.
    pub fn status_text(&self) -> Option<String> {
        match self {
            TickOutcome::Confirmed { name } => Some(format!("Playtime tracking started: {name}")),
            TickOutcome::Finished { name, .. } => Some(format!("Playtime tracked: {name}")),
            TickOutcome::GaveUp {
                reason: GiveUpReason::InstallPathMissing,
                ..
            } => Some("Playtime tracking: install path missing; stopped".to_string()),
            TickOutcome::GaveUp {
                reason: GiveUpReason::ProcessNotDetected,
                ..
            } => Some("Playtime tracking: game process not detected; stopped".to_string()),
            TickOutcome::Ignored | TickOutcome::Waiting | TickOutcome::Running => None,
        }
    }

    /// Whether the session is over after this outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TickOutcome::GaveUp { .. } | TickOutcome::Finished { .. })
    }
}

#[derive(Debug)]
struct ActiveSession {
    game_key: String,
    name: String,
    install_path: Option<PathBuf>,
    history_id: Option<Uuid>,
    started: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    confirmed: bool,
}

/// Tracks at most one session at a time.
pub struct SessionTracker {
    settings: TrackerSettings,
    source: Box<dyn ProcessSource>,
    ticks: Option<mpsc::Sender<PollTick>>,
    schedule: Option<PollSchedule>,
    generation: u64,
    session: Option<ActiveSession>,
}

impl SessionTracker {
    /// Tracker that polls only when [`SessionTracker::tick`] is called.
    pub fn new(settings: TrackerSettings, source: Box<dyn ProcessSource>) -> Self {
        Self {
            settings,
            source,
            ticks: None,
            schedule: None,
            generation: 0,
            session: None,
        }
    }

    /// Post [`PollTick`]s into `sender` while a session is active.
    pub fn with_ticks(mut self, sender: mpsc::Sender<PollTick>) -> Self {
        self.ticks = Some(sender);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TrackerState {
        match &self.session {
            None => TrackerState::Idle,
            Some(session) if session.confirmed => TrackerState::Tracking,
            Some(_) => TrackerState::WaitingConfirm,
        }
    }

    /// Key of the game being tracked.
    pub fn current_key(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.game_key.as_str())
    }

    /// Generation of the current (or last) session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Begin a session for `entry`, discarding any running one.
    pub fn start(&mut self, entry: &GameEntry, history_id: Option<Uuid>, now: DateTime<Utc>) {
        self.discard();
        self.generation += 1;
        self.session = Some(ActiveSession {
            game_key: entry.key(),
            name: entry.name.clone(),
            install_path: entry.install_path.clone(),
            history_id,
            started: now,
            last_seen: now,
            confirmed: false,
        });
        info!(game = %entry.key(), generation = self.generation, "playtime tracking armed");

        if let Some(sender) = &self.ticks {
            if tokio::runtime::Handle::try_current().is_ok() {
                self.schedule = Some(PollSchedule::start(
                    self.settings.tick(),
                    self.generation,
                    sender.clone(),
                ));
            } else {
                warn!("no tokio runtime; playtime polling disabled");
            }
        }
    }

    /// Handle a scheduled tick, ignoring ticks from earlier sessions.
    pub fn on_tick(
        &mut self,
        tick: PollTick,
        now: DateTime<Utc>,
        store: &mut LibraryStore,
    ) -> TickOutcome {
        if tick.generation != self.generation {
            debug!(
                stale = tick.generation,
                current = self.generation,
                "ignoring stale poll tick"
            );
            return TickOutcome::Ignored;
        }
        self.tick(now, store)
    }

    /// Observe processes once and advance the state machine.
    pub fn tick(&mut self, now: DateTime<Utc>, store: &mut LibraryStore) -> TickOutcome {
        let confirm_window = self.settings.confirm_window();
        let stop_after_gone = self.settings.stop_after_gone();
        let Some(session) = self.session.as_mut() else {
            self.cancel_schedule();
            return TickOutcome::Ignored;
        };

        let prefix = session
            .install_path
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty() && path.is_dir())
            .and_then(process::install_prefix);
        let Some(prefix) = prefix else {
            if !session.confirmed && elapsed(session.started, now) > confirm_window {
                let name = session.name.clone();
                self.discard();
                return TickOutcome::GaveUp {
                    name,
                    reason: GiveUpReason::InstallPathMissing,
                };
            }
            return if session.confirmed {
                TickOutcome::Running
            } else {
                TickOutcome::Waiting
            };
        };

        let running = self
            .source
            .executable_paths()
            .iter()
            .any(|exe| process::is_under(exe, &prefix));

        if running {
            session.last_seen = now;
            if !session.confirmed {
                session.confirmed = true;
                info!(game = %session.game_key, "game process detected");
                return TickOutcome::Confirmed {
                    name: session.name.clone(),
                };
            }
            return TickOutcome::Running;
        }

        if !session.confirmed {
            if elapsed(session.started, now) > confirm_window {
                let name = session.name.clone();
                self.discard();
                return TickOutcome::GaveUp {
                    name,
                    reason: GiveUpReason::ProcessNotDetected,
                };
            }
            return TickOutcome::Waiting;
        }

        if elapsed(session.last_seen, now) > stop_after_gone {
            let name = session.name.clone();
            let commit = self.stop(true, now, store);
            return TickOutcome::Finished { name, commit };
        }
        TickOutcome::Running
    }

    /// End the session. With `commit`, a confirmed session adds the time since
    /// launch to the store unless it is shorter than the minimum session
    /// length. An unconfirmed session is always discarded.
    pub fn stop(
        &mut self,
        commit: bool,
        now: DateTime<Utc>,
        store: &mut LibraryStore,
    ) -> Option<SessionCommit> {
        self.cancel_schedule();
        let session = self.session.take()?;
        if !commit || !session.confirmed {
            debug!(game = %session.game_key, confirmed = session.confirmed, "session discarded");
            return None;
        }

        let elapsed = elapsed(session.started, now);
        if elapsed < self.settings.min_session() {
            debug!(game = %session.game_key, secs = elapsed.as_secs_f64(), "session too short");
            return None;
        }
        let seconds_added = elapsed.as_secs_f64().round() as u64;
        if seconds_added == 0 {
            return None;
        }

        let total_seconds = store.add_tracked_seconds(&session.game_key, seconds_added);
        info!(
            game = %session.game_key,
            seconds_added,
            total_seconds,
            "session committed"
        );
        Some(SessionCommit {
            history_id: session.history_id,
            game_key: session.game_key,
            name: session.name,
            seconds_added,
            total_seconds,
        })
    }

    fn discard(&mut self) {
        self.cancel_schedule();
        if let Some(session) = self.session.take() {
            debug!(game = %session.game_key, "session discarded");
        }
    }

    fn cancel_schedule(&mut self) {
        if let Some(schedule) = self.schedule.take() {
            schedule.cancel();
        }
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}
