use std::{
    io::Read,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use super::{dedup_by_key, Hive, RegistryReader, ScanContext, Scanner, View};
use crate::{
    launcher::{LaunchError, LaunchTarget},
    models::{GameEntry, Platform},
};

const POWERSHELL_TIMEOUT: Duration = Duration::from_secs(8);
const GAME_CONFIG: &str = r"SOFTWARE\Microsoft\GamingServices\GameConfig";
const NON_GAME_MARKERS: [&str; 6] = [
    "DLC",
    "Content Pack",
    "Launch Tracker",
    "Game Pass Launch Tracker",
    "Stub",
    "Early Access",
];

/// Xbox app titles registered with Gaming Services.
///
/// Ids are package family names; install paths are never exposed.
#[derive(Debug, Clone, Copy, Default)]
pub struct XboxScanner;

impl Scanner for XboxScanner {
    fn platform(&self) -> Platform {
        Platform::Xbox
    }

    fn scan(&self, ctx: &ScanContext) -> Vec<GameEntry> {
        let registry = ctx.registry.as_ref();
        let (hive, view) = (Hive::LocalMachine, View::Registry64);

        let games: Vec<GameEntry> = registry
            .subkey_names(hive, view, GAME_CONFIG)
            .into_iter()
            .filter_map(|key| {
                let entry = parse_game_config(registry, &key);
                if entry.is_none() {
                    debug!("xbox: skipping {key}");
                }
                entry
            })
            .collect();

        let games = dedup_by_key(games);
        info!("xbox: found {} games", games.len());
        games
    }

    fn resolve_launch_target(
        &self,
        id: &str,
        _ctx: &ScanContext,
    ) -> Result<LaunchTarget, LaunchError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(LaunchError::unresolved(Platform::Xbox, id, "empty package family name"));
        }
        let output = run_powershell(&start_apps_script(id))
            .map_err(|err| LaunchError::unresolved(Platform::Xbox, id, err))?;
        let app_id = first_line(&output).ok_or_else(|| {
            LaunchError::unresolved(Platform::Xbox, id, "no Start menu entry for package")
        })?;
        Ok(LaunchTarget::command(
            "explorer.exe",
            vec![format!(r"shell:AppsFolder\{app_id}")],
        ))
    }
}

fn parse_game_config(registry: &dyn RegistryReader, key: &str) -> Option<GameEntry> {
    let (hive, view) = (Hive::LocalMachine, View::Registry64);
    let path = format!(r"{GAME_CONFIG}\{key}");
    let visuals = format!(r"{path}\ShellVisuals");

    let display_name = registry
        .non_blank(hive, view, &visuals, "DefaultDisplayName")
        .or_else(|| registry.non_blank(hive, view, &visuals, "OverrideDisplayName"))
        .or_else(|| registry.non_blank(hive, view, &path, "Name"))?;
    if looks_like_non_game(&display_name) || !has_executable(registry, &path) {
        return None;
    }

    let package = registry
        .non_blank(hive, view, &path, "Name")
        .or_else(|| package_name_from_key(key))?;
    let family = family_suffix_from_key(key)?;
    Some(GameEntry::new(
        Platform::Xbox,
        format!("{package}_{family}"),
        display_name,
    ))
}

fn looks_like_non_game(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    name.is_empty()
        || NON_GAME_MARKERS
            .iter()
            .any(|marker| name.contains(&marker.to_lowercase()))
}

fn has_executable(registry: &dyn RegistryReader, path: &str) -> bool {
    let (hive, view) = (Hive::LocalMachine, View::Registry64);
    let executables = format!(r"{path}\Executable");
    registry
        .subkey_names(hive, view, &executables)
        .into_iter()
        .filter_map(|sub| registry.non_blank(hive, view, &format!(r"{executables}\{sub}"), "Name"))
        .any(|name| name.to_ascii_lowercase().ends_with(".exe"))
}

/// `<PackageName>_<Version>_<Arch>__<FamilySuffix>` → `<FamilySuffix>`.
fn family_suffix_from_key(key: &str) -> Option<&str> {
    key.split_once("__")
        .map(|(_, suffix)| suffix)
        .filter(|suffix| !suffix.trim().is_empty())
}

fn package_name_from_key(key: &str) -> Option<String> {
    match key.find('_') {
        Some(index) if index > 0 => Some(key[..index].to_string()),
        _ => None,
    }
}

fn start_apps_script(package_family: &str) -> String {
    let like = package_family
        .replace('`', "``")
        .replace('[', "`[")
        .replace(']', "`]")
        .replace('*', "`*")
        .replace('?', "`?")
        .replace('\'', "''");
    format!(
        "$app = Get-StartApps | Where-Object {{ $_.AppID -like '*{like}*' }} | Select-Object -First 1; \
         if($null -ne $app) {{ $app.AppID }}"
    )
}

fn run_powershell(script: &str) -> Result<String, String> {
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", script]);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    run_with_deadline(command, POWERSHELL_TIMEOUT)
}

/// Run `command` to completion and return its stdout, killing it once
/// `timeout` passes.
fn run_with_deadline(mut command: Command, timeout: Duration) -> Result<String, String> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| format!("failed to run {program}: {err}"))?;

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if start.elapsed() > timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("{program} timed out after {}s", timeout.as_secs_f64()));
            }
            Ok(None) => thread::sleep(Duration::from_millis(20)),
            Err(err) => return Err(format!("failed to wait for {program}: {err}")),
        }
    }

    let mut output = String::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout
            .read_to_string(&mut output)
            .map_err(|err| format!("failed to read {program} output: {err}"))?;
    }
    Ok(output)
}

fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}
