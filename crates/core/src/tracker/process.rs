use std::path::{Path, PathBuf};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Enumerates the executables of live processes.
///
/// Processes whose executable cannot be read (access denied, protected,
/// already exited) are skipped rather than failing the whole listing.
pub trait ProcessSource: Send {
    /// Executable paths of every readable live process.
    fn executable_paths(&mut self) -> Vec<PathBuf>;
}

/// Process listing backed by `sysinfo`.
pub struct SystemProcesses {
    system: System,
}

impl SystemProcesses {
    /// Fresh listing with no processes loaded yet.
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SystemProcesses {
    fn executable_paths(&mut self) -> Vec<PathBuf> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );
        self.system
            .processes()
            .values()
            .filter_map(|process| process.exe())
            .filter(|exe| !exe.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Case-insensitive, separator-agnostic form of `path` ending in `/`.
pub(crate) fn install_prefix(path: &Path) -> Option<String> {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut prefix = fold_path(&absolute);
    if prefix.trim_matches('/').is_empty() {
        return None;
    }
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    Some(prefix)
}

/// Whether `exe` lies under the folded `prefix`.
pub(crate) fn is_under(exe: &Path, prefix: &str) -> bool {
    fold_path(exe).starts_with(prefix)
}

fn fold_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}
