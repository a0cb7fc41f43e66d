use std::path::{Path, PathBuf};

use tracing::info;

use super::{
    dedup_by_key,
    registry::{extract_exe_path, find_uninstall_dir, uninstall_entries},
    Hive, RegistryReader, ScanContext, Scanner, View,
};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

const PATCHLINE_LIVE: &str = "live";
const VALORANT_KEYS: [&str; 2] = [
    r"SOFTWARE\Riot Games\VALORANT",
    r"SOFTWARE\WOW6432Node\Riot Games\VALORANT",
];
const CLIENT_KEYS: [&str; 2] = [
    r"SOFTWARE\Riot Games\Riot Client",
    r"SOFTWARE\WOW6432Node\Riot Games\Riot Client",
];

/// Riot Games titles, located through uninstall entries and the Riot Games
/// install root. Launched through `RiotClientServices.exe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiotScanner;

impl Scanner for RiotScanner {
    fn platform(&self) -> Platform {
        Platform::Riot
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let registry = ctx.registry.as_ref();
        let riot_root = riot_games_root(ctx);
        let mut games = Vec::new();

        let valorant = |path: PathBuf| {
            GameEntry::new(Platform::Riot, "valorant", "VALORANT").with_install_path(path)
        };
        if let Some(dir) = find_uninstall_dir(registry, "VALORANT") {
            games.push(valorant(dir.into()));
        } else {
            if let Some(dir) = riot_root
                .as_ref()
                .map(|root| root.join("VALORANT").join(PATCHLINE_LIVE))
                .filter(|dir| dir.is_dir())
            {
                games.push(valorant(dir));
            }
            let from_registry = VALORANT_KEYS
                .into_iter()
                .find_map(|key| registry.any_view(Hive::LocalMachine, key, "InstallPath"))
                .filter(|dir| Path::new(dir).is_dir());
            if let Some(dir) = from_registry {
                games.push(valorant(dir.into()));
            }
        }

        let league = |path: PathBuf| {
            GameEntry::new(Platform::Riot, "league_of_legends", "League of Legends")
                .with_install_path(path)
        };
        if let Some(dir) = find_uninstall_dir(registry, "League of Legends") {
            games.push(league(dir.into()));
        }
        if let Some(dir) = riot_root
            .as_ref()
            .map(|root| root.join("League of Legends"))
            .filter(|dir| dir.is_dir())
        {
            games.push(league(dir));
        }

        let games = dedup_by_key(games);
        info!("riot: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Riot, id, "empty game id"));
        }
        let client = riot_client_services(ctx.registry.as_ref()).ok_or_else(|| {
            LaunchError::unresolved(Platform::Riot, id, "RiotClientServices.exe not found")
        })?;

        let (product, patchline) = match id {
            "riot_client" => ("Riot_Client", ""),
            other => (other, PATCHLINE_LIVE),
        };
        Ok(LaunchTarget::command(
            client,
            vec![
                format!("--launch-product={product}"),
                format!("--launch-patchline={patchline}"),
            ],
        ))
    }
}

/// Parent of the Riot Client install, else `<Program Files>/Riot Games`.
fn riot_games_root(ctx: &ScanContext) -> Option<PathBuf> {
    if let Some(client) = find_uninstall_dir(ctx.registry.as_ref(), "Riot Client") {
        let client = PathBuf::from(client);
        return Some(match client.parent() {
            Some(parent) if parent.is_dir() => parent.to_path_buf(),
            _ => client,
        });
    }
    ctx.folders
        .program_files
        .as_ref()
        .map(|dir| dir.join("Riot Games"))
        .filter(|dir| dir.is_dir())
}

fn riot_client_services(registry: &dyn RegistryReader) -> Option<PathBuf> {
    for hive in [Hive::CurrentUser, Hive::LocalMachine] {
        for view in View::ALL {
            for entry in uninstall_entries(registry, hive, view) {
                if !entry
                    .display_name
                    .to_ascii_lowercase()
                    .starts_with("riot client")
                {
                    continue;
                }
                if let Some(exe) = entry
                    .uninstall_string
                    .as_deref()
                    .and_then(extract_exe_path)
                    .map(PathBuf::from)
                    .filter(|exe| exe.is_file())
                {
                    return Some(exe);
                }
                if let Some(exe) = entry
                    .install_location
                    .as_deref()
                    .map(|dir| Path::new(dir).join("RiotClientServices.exe"))
                    .filter(|exe| exe.is_file())
                {
                    return Some(exe);
                }
            }
        }
    }

    [Hive::LocalMachine, Hive::CurrentUser]
        .into_iter()
        .flat_map(|hive| CLIENT_KEYS.into_iter().map(move |key| (hive, key)))
        .find_map(|(hive, key)| registry.any_view(hive, key, "Path"))
        .map(PathBuf::from)
        .filter(|exe| exe.is_file())
}
