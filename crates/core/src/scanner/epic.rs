use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{dedup_by_key, files_with_extension, json_bool, json_str, read_text, ScanContext, Scanner};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

/// Epic Games Launcher: `*.item` JSON manifests under ProgramData.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpicScanner;

impl Scanner for EpicScanner {
    fn platform(&self) -> Platform {
        Platform::Epic
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let Some(dir) = manifest_dir(ctx) else {
            return Vec::new();
        };

        let games: Vec<GameEntry> = files_with_extension(&dir, "item")
            .into_iter()
            .filter_map(|file| {
                let entry = parse_manifest(&file);
                if entry.is_none() {
                    debug!("epic: skipping {}", file.display());
                }
                entry
            })
            .collect();

        let games = dedup_by_key(games);
        info!("epic: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        _ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Epic, id, "empty app name"));
        }
        Ok(LaunchTarget::Uri(format!(
            "com.epicgames.launcher://apps/{id}?action=launch&silent=true"
        )))
    }
}

fn manifest_dir(ctx: &ScanContext) -> Option<PathBuf> {
    ctx.folders.program_data.as_ref().map(|dir| {
        dir.join("Epic")
            .join("EpicGamesLauncher")
            .join("Data")
            .join("Manifests")
    })
}

fn parse_manifest(file: &Path) -> Option<GameEntry> {
    let text = read_text(file)?;
    let root: serde_json::Value = match serde_json::from_str(&text) {
        Ok(root) => root,
        Err(err) => {
            debug!("epic: invalid manifest {}: {err}", file.display());
            return None;
        }
    };

    if !json_bool(&root, "bIsInstalled").unwrap_or(true) {
        return None;
    }
    let name = json_str(&root, &["DisplayName"])?;
    let id = json_str(&root, &["AppName"])?;
    let mut entry = GameEntry::new(Platform::Epic, id, name);
    if let Some(location) = json_str(&root, &["InstallLocation"]) {
        entry = entry.with_install_path(location);
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use anyhow::Result;
    use tempfile::tempdir;

    use super::*;
    use crate::scanner::{KnownFolders, NoRegistry};

    #[test]
    fn parses_installed_manifests_only() -> Result<()> {
        let temp = tempdir()?;
        let folders = KnownFolders::rooted_at(temp.path());
        let ctx = ScanContext::new(folders, Arc::new(NoRegistry));
        let dir = manifest_dir(&ctx).unwrap();
        fs::create_dir_all(&dir)?;

        fs::write(
            dir.join("A1.item"),
            r#"{"DisplayName":"Fortnite","AppName":"Fortnite","InstallLocation":"C:\\Games\\Fortnite"}"#,
        )?;
        fs::write(
            dir.join("B2.item"),
            r#"{"DisplayName":"Rocket League","AppName":"Sugar","bIsInstalled":false}"#,
        )?;
        fs::write(dir.join("C3.item"), r#"{"DisplayName":"No App Name"}"#)?;
        fs::write(dir.join("D4.item"), "{ not json")?;
        fs::write(dir.join("notes.txt"), r#"{"DisplayName":"X","AppName":"X"}"#)?;

        let games = EpicScanner.scan(&ctx);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].key(), "epic:Fortnite");
        assert_eq!(
            games[0].install_path.as_deref(),
            Some(Path::new(r"C:\Games\Fortnite"))
        );
        Ok(())
    }

    #[test]
    fn launch_uri_is_silent() -> Result<()> {
        let ctx = ScanContext::new(KnownFolders::default(), Arc::new(NoRegistry));
        assert_eq!(
            EpicScanner.resolve_launch_target("Sugar", &ctx)?,
            LaunchTarget::Uri("com.epicgames.launcher://apps/Sugar?action=launch&silent=true".into())
        );
        assert!(EpicScanner.resolve_launch_target(" ", &ctx).is_err());
        Ok(())
    }
}
