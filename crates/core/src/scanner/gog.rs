use std::path::Path;

use tracing::info;

use super::{dedup_by_key, Hive, RegistryReader, ScanContext, Scanner, View};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

const GAMES_KEYS: [&str; 2] = [r"SOFTWARE\GOG.com\Games", r"SOFTWARE\WOW6432Node\GOG.com\Games"];
const HIVES: [Hive; 2] = [Hive::LocalMachine, Hive::CurrentUser];

/// GOG: one `GOG.com\Games\<id>` registry key per installed game.
#[derive(Debug, Clone, Copy, Default)]
pub struct GogScanner;

impl Scanner for GogScanner {
    fn platform(&self) -> Platform {
        Platform::Gog
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let registry = ctx.registry.as_ref();
        let mut games = Vec::new();
        for hive in HIVES {
            for view in View::ALL {
                for root in GAMES_KEYS {
                    for id in registry.subkey_names(hive, view, root) {
                        let path = format!(r"{root}\{id}");
                        let value = |name: &str| registry.non_blank(hive, view, &path, name);
                        let name = value("gameName")
                            .or_else(|| value("Name"))
                            .or_else(|| value("name"))
                            .unwrap_or_else(|| id.clone());
                        let install = value("path").or_else(|| value("installPath"));

                        let mut entry = GameEntry::new(Platform::Gog, id.clone(), name);
                        if let Some(install) = install {
                            entry = entry.with_install_path(install);
                        }
                        games.push(entry);
                    }
                }
            }
        }

        let games = dedup_by_key(games);
        info!("gog: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Gog, id, "empty game id"));
        }
        let registry = ctx.registry.as_ref();
        let exe = ["exe", "Exe", "launchCommand"]
            .into_iter()
            .find_map(|name| value_across_views(registry, id, name));
        let install =
            value_across_views(registry, id, "path").or_else(|| value_across_views(registry, id, "installPath"));

        match exe {
            Some(exe) => {
                let program = executable_part(&exe);
                let joined = match install.as_deref() {
                    Some(dir) if !is_rooted(&program) => Path::new(dir).join(&program),
                    _ => program.into(),
                };
                Ok(LaunchTarget::Command {
                    program: joined,
                    args: Vec::new(),
                    working_dir: install.map(Into::into),
                })
            }
            None => Ok(LaunchTarget::Uri(format!("goggalaxy://openGameView/{id}"))),
        }
    }
}

fn value_across_views(registry: &dyn RegistryReader, id: &str, name: &str) -> Option<String> {
    HIVES.into_iter().find_map(|hive| {
        View::ALL.into_iter().find_map(|view| {
            GAMES_KEYS
                .into_iter()
                .find_map(|root| registry.non_blank(hive, view, &format!(r"{root}\{id}"), name))
        })
    })
}

/// Strip arguments from a launch command: the quoted prefix, or the text
/// before the first space when the command names an `.exe`.
fn executable_part(command: &str) -> String {
    let command = command.trim();
    if let Some(rest) = command.strip_prefix('"') {
        if let Some(end) = rest.find('"').filter(|end| *end > 0) {
            return rest[..end].to_string();
        }
        return command.to_string();
    }
    match command.find(' ') {
        Some(space) if space > 0 && command.to_ascii_lowercase().contains(".exe") => {
            command[..space].to_string()
        }
        _ => command.to_string(),
    }
}

/// Rooted on either Windows or the host (`C:\`, `\\server`, `/`).
fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    Path::new(path).has_root()
        || path.starts_with('\\')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}
