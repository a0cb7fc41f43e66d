#![warn(clippy::all, missing_docs)]

//! Core engine for gamedice, a random picker for installed games.
//!
//! The crate discovers games across Steam, Epic, GOG, Ubisoft Connect,
//! Amazon Games, Riot and the Xbox app, keeps per-game state in a JSON store,
//! picks one at random under tag and favourite constraints, and infers play
//! sessions by watching running processes.

pub mod aggregate;
pub mod config;
pub mod history;
pub mod launcher;
pub mod library;
pub mod models;
pub mod picker;
pub mod scanner;
pub mod secret;
pub mod steam;
pub mod store;
pub mod tags;
pub mod tracker;

pub use config::AppConfig;
pub use history::{HistoryLedger, HistoryStats, LaunchHistoryEntry};
pub use launcher::{LaunchError, LaunchTarget, Launcher, SystemLauncher};
pub use library::{Library, LibraryEvent, PickedGame};
pub use models::{GameEntry, Platform};
pub use scanner::ScanContext;
pub use store::LibraryStore;
pub use tags::{GameFilter, TagFilter};
pub use tracker::{PollTick, SessionCommit, SessionTracker, SystemProcesses, TickOutcome};
