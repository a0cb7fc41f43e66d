use std::{
    env,
    path::{Path, PathBuf},
};

/// Well-known directories the scanners search under.
///
/// Every field is optional so adapters simply skip locations the host does not
/// have (for example `Program Files` on Linux).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFolders {
    /// `%ProgramFiles%`.
    pub program_files: Option<PathBuf>,
    /// `%ProgramFiles(x86)%`.
    pub program_files_x86: Option<PathBuf>,
    /// `%ProgramData%`.
    pub program_data: Option<PathBuf>,
    /// `%LOCALAPPDATA%` or the XDG data-local directory.
    pub local_app_data: Option<PathBuf>,
    /// `%APPDATA%` or the XDG data directory.
    pub roaming_app_data: Option<PathBuf>,
    /// The user's home directory.
    pub home: Option<PathBuf>,
}

impl KnownFolders {
    /// Resolve folders from the current environment.
    pub fn from_env() -> Self {
        Self {
            program_files: env_dir("ProgramW6432")
                .or_else(|| env_dir("ProgramFiles"))
                .or_else(|| windows_default(r"C:\Program Files")),
            program_files_x86: env_dir("ProgramFiles(x86)")
                .or_else(|| windows_default(r"C:\Program Files (x86)")),
            program_data: env_dir("ProgramData")
                .or_else(|| windows_default(r"C:\ProgramData")),
            local_app_data: dirs::data_local_dir(),
            roaming_app_data: dirs::data_dir(),
            home: dirs::home_dir(),
        }
    }

    /// Lay every folder out beneath `root`, mirroring a Windows profile.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            program_files: Some(root.join("Program Files")),
            program_files_x86: Some(root.join("Program Files (x86)")),
            program_data: Some(root.join("ProgramData")),
            local_app_data: Some(root.join("AppData").join("Local")),
            roaming_app_data: Some(root.join("AppData").join("Roaming")),
            home: Some(root.join("home")),
        }
    }
}

fn env_dir(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn windows_default(path: &str) -> Option<PathBuf> {
    cfg!(windows).then(|| PathBuf::from(path))
}
