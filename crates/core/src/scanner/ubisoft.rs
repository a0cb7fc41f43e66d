use std::{collections::HashMap, fs, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{dedup_by_key, Hive, ScanContext, Scanner, View};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

const INSTALLS: &str = r"SOFTWARE\Ubisoft\Launcher\Installs";
const SOURCES: [(Hive, View); 4] = [
    (Hive::LocalMachine, View::Registry32),
    (Hive::LocalMachine, View::Registry64),
    (Hive::CurrentUser, View::Registry32),
    (Hive::CurrentUser, View::Registry64),
];

static INSTALL_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Installs\\(\d+)\\InstallDir").unwrap());
static GAMENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bGAMENAME\s*:\s*"([^"]+)""#).unwrap());
static ROOT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\broot\s*:\s*(?:\r?\n)+\s*name\s*:\s*([A-Za-z0-9_\-]+)").unwrap());
static SHORTCUT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bshortcut_name\s*:\s*(.+)").unwrap());

/// Ubisoft Connect: `Launcher\Installs\<id>` registry keys, named through the
/// launcher's cached configuration file when the registry has no name.
#[derive(Debug, Clone, Copy, Default)]
pub struct UbisoftScanner;

impl Scanner for UbisoftScanner {
    fn platform(&self) -> Platform {
        Platform::Ubisoft
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let registry = ctx.registry.as_ref();
        let names = ctx
            .folders
            .program_files_x86
            .as_ref()
            .map(|dir| {
                dir.join("Ubisoft")
                    .join("Ubisoft Game Launcher")
                    .join("cache")
                    .join("configuration")
                    .join("configurations")
            })
            .filter(|path| path.is_file())
            .map(|path| load_name_map(&path))
            .unwrap_or_default();

        let mut games = Vec::new();
        for (hive, view) in SOURCES {
            for id in registry.subkey_names(hive, view, INSTALLS) {
                let path = format!(r"{INSTALLS}\{id}");
                let Some(install) = registry
                    .non_blank(hive, view, &path, "InstallDir")
                    .filter(|dir| Path::new(dir).is_dir())
                else {
                    continue;
                };
                let name = registry
                    .non_blank(hive, view, &path, "DisplayName")
                    .or_else(|| registry.non_blank(hive, view, &path, "InstallName"))
                    .or_else(|| names.get(&id.to_lowercase()).cloned())
                    .unwrap_or_else(|| id.trim().to_string());
                if name.is_empty() {
                    continue;
                }
                games.push(GameEntry::new(Platform::Ubisoft, id, name).with_install_path(install));
            }
        }

        let games = dedup_by_key(games);
        info!("ubisoft: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        _ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Ubisoft, id, "empty game id"));
        }
        Ok(LaunchTarget::Uri(format!("uplay://launch/{id}/0")))
    }
}

/// Install id (lowercased) → display name, from the launcher's
/// `configurations` cache.
fn load_name_map(path: &Path) -> HashMap<String, String> {
    match fs::read(path) {
        Ok(bytes) => parse_configurations(&String::from_utf8_lossy(&bytes)),
        Err(err) => {
            debug!("ubisoft: failed to read {}: {err}", path.display());
            HashMap::new()
        }
    }
}

fn parse_configurations(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for block in text.split("version: 2.0").filter(|block| !block.is_empty()) {
        let ids: Vec<String> = INSTALL_ID
            .captures_iter(block)
            .map(|caps| caps[1].to_lowercase())
            .collect();
        if ids.is_empty() {
            continue;
        }
        let Some(name) = block_name(block) else {
            continue;
        };
        for id in ids {
            map.entry(id).or_insert_with(|| name.clone());
        }
    }
    map
}

fn block_name(block: &str) -> Option<String> {
    if let Some(caps) = GAMENAME.captures(block) {
        return Some(caps[1].trim().to_string());
    }

    if let Some(token) = ROOT_NAME.captures(block).map(|caps| caps[1].trim().to_string()) {
        let localized = Regex::new(&format!(
            r"(?i)\blocalizations\s*:\s*(?:\r?\n)+\s*default\s*:\s*(?:\r?\n)+\s*{}\s*:\s*(.+)",
            regex::escape(&token)
        ))
        .ok()
        .and_then(|re| re.captures(block).map(|caps| clean_value(&caps[1])))
        .filter(|name| !name.is_empty());
        if localized.is_some() {
            return localized;
        }
    }

    SHORTCUT_NAME
        .captures(block)
        .map(|caps| clean_value(&caps[1]))
        .filter(|name| !name.is_empty())
}

fn clean_value(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::scanner::{KnownFolders, MemoryRegistry};

    const CONFIGURATIONS: &str = "version: 2.0\nroot:\n  name: l1\n  start_game:\n    online:\n      executables:\n        - working_directory:\n            register: HKEY_LOCAL_MACHINE\\SOFTWARE\\Ubisoft\\Launcher\\Installs\\5595\\InstallDir\nlocalizations:\n  default:\n    l1: For Honor\n\
version: 2.0\nroot:\n  name: Far Cry 4\n  installer:\n    register: HKEY_LOCAL_MACHINE\\SOFTWARE\\Ubisoft\\Launcher\\Installs\\420\\InstallDir\nlocalizations:\n  default:\n    GAMENAME: \"Far Cry 4\"\n\
version: 2.0\nroot:\n  executables:\n    - shortcut_name: \"Anno 1800\"\n      register: HKEY_LOCAL_MACHINE\\SOFTWARE\\Ubisoft\\Launcher\\Installs\\4553\\InstallDir\n";

    #[test]
    fn parses_configuration_names() {
        let map = parse_configurations(CONFIGURATIONS);
        assert_eq!(map.get("5595").map(String::as_str), Some("For Honor"));
        assert_eq!(map.get("420").map(String::as_str), Some("Far Cry 4"));
        assert_eq!(map.get("4553").map(String::as_str), Some("Anno 1800"));
    }

    #[test]
    fn scans_installed_entries_with_name_fallbacks() -> Result<()> {
        let temp = tempdir()?;
        let folders = KnownFolders::rooted_at(temp.path());
        let config_dir = folders
            .program_files_x86
            .clone()
            .unwrap()
            .join("Ubisoft")
            .join("Ubisoft Game Launcher")
            .join("cache")
            .join("configuration");
        fs::create_dir_all(&config_dir)?;
        fs::write(config_dir.join("configurations"), CONFIGURATIONS)?;

        let honor = temp.path().join("Games").join("For Honor");
        let anno = temp.path().join("Games").join("Anno");
        fs::create_dir_all(&honor)?;
        fs::create_dir_all(&anno)?;

        let mut registry = MemoryRegistry::new();
        registry
            .set(Hive::LocalMachine, View::Registry32, r"SOFTWARE\Ubisoft\Launcher\Installs\5595", "InstallDir", &honor.to_string_lossy())
            .set(Hive::CurrentUser, View::Registry64, r"SOFTWARE\Ubisoft\Launcher\Installs\4553", "InstallDir", &anno.to_string_lossy())
            .set(Hive::CurrentUser, View::Registry64, r"SOFTWARE\Ubisoft\Launcher\Installs\4553", "DisplayName", "Anno 1800 (Uplay)")
            .set(Hive::LocalMachine, View::Registry32, r"SOFTWARE\Ubisoft\Launcher\Installs\420", "InstallDir", "/not/installed");

        let ctx = ScanContext::new(folders, Arc::new(registry));
        let games = UbisoftScanner.scan(&ctx);
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].key(), "ubisoft:5595");
        assert_eq!(games[0].name, "For Honor");
        assert_eq!(games[1].name, "Anno 1800 (Uplay)");
        assert_eq!(
            UbisoftScanner.resolve_launch_target("5595", &ctx)?,
            LaunchTarget::Uri("uplay://launch/5595/0".into())
        );
        Ok(())
    }
}
