use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use super::{dedup_by_key, files_with_extension, read_text, Hive, ScanContext, Scanner};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

static APPID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)"appid"\s*"(\d+)""#).unwrap());
static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)"name"\s*"([^"]+)""#).unwrap());
static INSTALLDIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)"installdir"\s*"([^"]+)""#).unwrap());
static LIBRARY_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)"path"\s*"([^"]+)""#).unwrap());

/// Steam: `appmanifest_*.acf` files across every library folder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteamScanner;

impl Scanner for SteamScanner {
    fn platform(&self) -> Platform {
        Platform::Steam
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let Some(root) = steam_root(ctx) else {
            debug!("steam: no installation found");
            return Vec::new();
        };

        let mut games = Vec::new();
        for library in library_folders(&root) {
            let steamapps = library.join("steamapps");
            for manifest in files_with_extension(&steamapps, "acf") {
                let is_app_manifest = manifest
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.to_ascii_lowercase().starts_with("appmanifest_"));
                if !is_app_manifest {
                    continue;
                }
                match read_text(&manifest).and_then(|text| parse_app_manifest(&text, &library)) {
                    Some(entry) => games.push(entry),
                    None => debug!("steam: skipping {}", manifest.display()),
                }
            }
        }

        let games = dedup_by_key(games);
        info!("steam: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        _ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Steam, id, "empty app id"));
        }
        Ok(LaunchTarget::Uri(format!("steam://rungameid/{id}")))
    }
}

/// The Steam installation directory, if one exists.
pub fn steam_root(ctx: &ScanContext) -> Option<PathBuf> {
    let from_registry = ctx
        .registry
        .any_view(Hive::CurrentUser, r"Software\Valve\Steam", "SteamPath")
        .map(PathBuf::from);

    let folders = &ctx.folders;
    let candidates = [
        from_registry,
        folders.program_files_x86.as_ref().map(|dir| dir.join("Steam")),
        folders.program_files.as_ref().map(|dir| dir.join("Steam")),
        folders.local_app_data.as_ref().map(|dir| dir.join("Steam")),
        folders.home.as_ref().map(|dir| dir.join(".steam").join("steam")),
        folders
            .home
            .as_ref()
            .map(|dir| dir.join(".local").join("share").join("Steam")),
    ];
    candidates.into_iter().flatten().find(|dir| dir.is_dir())
}

/// The root library plus every existing library listed in
/// `libraryfolders.vdf`, deduplicated case-insensitively.
fn library_folders(root: &Path) -> Vec<PathBuf> {
    let mut libraries = vec![root.to_path_buf()];
    let vdf = root.join("steamapps").join("libraryfolders.vdf");
    if let Some(text) = vdf.is_file().then(|| read_text(&vdf)).flatten() {
        libraries.extend(
            parse_library_paths(&text)
                .into_iter()
                .filter(|path| path.is_dir()),
        );
    }

    let mut seen = HashSet::new();
    libraries.retain(|path| {
        let folded = path
            .to_string_lossy()
            .trim_end_matches(['/', '\\'])
            .to_lowercase();
        seen.insert(folded)
    });
    libraries
}

fn parse_library_paths(text: &str) -> Vec<PathBuf> {
    LIBRARY_PATH
        .captures_iter(text)
        .map(|caps| PathBuf::from(caps[1].replace("\\\\", "\\").trim()))
        .collect()
}

fn parse_app_manifest(text: &str, library: &Path) -> Option<GameEntry> {
    let capture = |re: &Regex| {
        re.captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let app_id = capture(&APPID)?;
    let name = capture(&NAME)?;
    let mut entry = GameEntry::new(Platform::Steam, app_id, name);
    if let Some(dir) = capture(&INSTALLDIR) {
        entry = entry.with_install_path(library.join("steamapps").join("common").join(dir));
    }
    Some(entry)
}
