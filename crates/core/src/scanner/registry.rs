//! Read-only registry access behind a trait so adapters run anywhere.

use std::{path::Path, sync::Arc};

/// Registry root a lookup starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Hive {
    /// `HKEY_LOCAL_MACHINE`.
    LocalMachine,
    /// `HKEY_CURRENT_USER`.
    CurrentUser,
}

/// WOW64 registry view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum View {
    /// Native 64-bit view.
    Registry64,
    /// Redirected 32-bit view.
    Registry32,
}

impl View {
    /// Both views, 64-bit first.
    pub const ALL: [View; 2] = [View::Registry64, View::Registry32];
}

/// Fallible key/value lookups. Missing keys, closed hives and access errors
/// all read as "nothing there".
pub trait RegistryReader: Send + Sync {
    /// Names of the direct subkeys of `path`.
    fn subkey_names(&self, hive: Hive, view: View, path: &str) -> Vec<String>;
    /// A string value of the key at `path`.
    fn string_value(&self, hive: Hive, view: View, path: &str, name: &str) -> Option<String>;

    /// Non-blank string value, trimmed.
    fn non_blank(&self, hive: Hive, view: View, path: &str, name: &str) -> Option<String> {
        self.string_value(hive, view, path, name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// First non-blank value of `name` at `path` across both views.
    fn any_view(&self, hive: Hive, path: &str, name: &str) -> Option<String> {
        View::ALL
            .into_iter()
            .find_map(|view| self.non_blank(hive, view, path, name))
    }
}

/// Registry for hosts without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

impl RegistryReader for NoRegistry {
    fn subkey_names(&self, _: Hive, _: View, _: &str) -> Vec<String> {
        Vec::new()
    }

    fn string_value(&self, _: Hive, _: View, _: &str, _: &str) -> Option<String> {
        None
    }
}

/// The host registry: `winreg` on Windows, empty elsewhere.
pub fn system_registry() -> Arc<dyn RegistryReader> {
    #[cfg(windows)]
    {
        Arc::new(WindowsRegistry)
    }
    #[cfg(not(windows))]
    {
        Arc::new(NoRegistry)
    }
}

#[cfg(windows)]
pub use self::win::WindowsRegistry;

#[cfg(windows)]
mod win {
    use std::io;

    use tracing::debug;
    use winreg::{
        enums::{
            HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ, KEY_WOW64_32KEY, KEY_WOW64_64KEY,
        },
        RegKey,
    };

    use super::{Hive, RegistryReader, View};

    /// Registry backed by the Win32 API.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct WindowsRegistry;

    impl WindowsRegistry {
        fn open(hive: Hive, view: View, path: &str) -> io::Result<RegKey> {
            let root = RegKey::predef(match hive {
                Hive::LocalMachine => HKEY_LOCAL_MACHINE,
                Hive::CurrentUser => HKEY_CURRENT_USER,
            });
            let wow = match view {
                View::Registry64 => KEY_WOW64_64KEY,
                View::Registry32 => KEY_WOW64_32KEY,
            };
            root.open_subkey_with_flags(path, KEY_READ | wow)
        }
    }

    impl RegistryReader for WindowsRegistry {
        fn subkey_names(&self, hive: Hive, view: View, path: &str) -> Vec<String> {
            match Self::open(hive, view, path) {
                Ok(key) => key.enum_keys().filter_map(Result::ok).collect(),
                Err(err) => {
                    debug!("registry {hive:?}/{view:?} {path}: {err}");
                    Vec::new()
                }
            }
        }

        fn string_value(&self, hive: Hive, view: View, path: &str, name: &str) -> Option<String> {
            Self::open(hive, view, path)
                .and_then(|key| key.get_value::<String, _>(name))
                .ok()
        }
    }
}

/// Location of the per-machine and per-user uninstall entries.
pub const UNINSTALL_PATH: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";

/// Fields of one `Uninstall\*` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallEntry {
    /// `DisplayName`.
    pub display_name: String,
    /// `InstallLocation`, when set.
    pub install_location: Option<String>,
    /// `UninstallString`, when set.
    pub uninstall_string: Option<String>,
}

/// Every uninstall entry with a display name in one hive/view.
pub fn uninstall_entries(registry: &dyn RegistryReader, hive: Hive, view: View) -> Vec<UninstallEntry> {
    registry
        .subkey_names(hive, view, UNINSTALL_PATH)
        .into_iter()
        .filter_map(|name| {
            let path = format!(r"{UNINSTALL_PATH}\{name}");
            let display_name = registry.non_blank(hive, view, &path, "DisplayName")?;
            Some(UninstallEntry {
                display_name,
                install_location: registry.non_blank(hive, view, &path, "InstallLocation"),
                uninstall_string: registry.non_blank(hive, view, &path, "UninstallString"),
            })
        })
        .collect()
}

/// Install directory of the uninstall entry named exactly `display_name`
/// (case-insensitive), searched across LM/CU and both views.
///
/// Prefers `InstallLocation`, then the directory of the uninstall executable;
/// only existing directories count.
pub fn find_uninstall_dir(registry: &dyn RegistryReader, display_name: &str) -> Option<String> {
    for hive in [Hive::LocalMachine, Hive::CurrentUser] {
        for view in View::ALL {
            for entry in uninstall_entries(registry, hive, view) {
                if !entry.display_name.eq_ignore_ascii_case(display_name) {
                    continue;
                }
                if let Some(location) = entry
                    .install_location
                    .as_deref()
                    .filter(|location| Path::new(location).is_dir())
                {
                    return Some(location.to_string());
                }
                let dir = entry
                    .uninstall_string
                    .as_deref()
                    .and_then(extract_exe_path)
                    .and_then(|exe| Path::new(&exe).parent().map(|dir| dir.to_path_buf()))
                    .filter(|dir| !dir.as_os_str().is_empty() && dir.is_dir());
                if let Some(dir) = dir {
                    return Some(dir.to_string_lossy().into_owned());
                }
            }
        }
    }
    None
}

/// Executable part of a command line: the quoted prefix, or everything up to
/// and including the first `.exe`.
pub fn extract_exe_path(command: &str) -> Option<String> {
    let command = command.trim();
    if let Some(rest) = command.strip_prefix('"') {
        return rest
            .find('"')
            .filter(|end| *end > 0)
            .map(|end| rest[..end].to_string());
    }
    let end = command.to_ascii_lowercase().find(".exe")?;
    Some(command[..end + 4].to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use super::{Hive, RegistryReader, View};

    #[derive(Debug, Clone, Default)]
    struct MemoryKey {
        path: String,
        values: BTreeMap<String, String>,
    }

    /// In-memory registry. Paths and value names are case-insensitive like the
    /// real thing.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct MemoryRegistry {
        keys: BTreeMap<(Hive, View, String), MemoryKey>,
    }

    impl MemoryRegistry {
        /// Empty registry.
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Create a key and its parents.
        pub(crate) fn insert_key(&mut self, hive: Hive, view: View, path: &str) -> &mut Self {
            let path = clean_path(path);
            let mut prefix = String::new();
            for segment in path.split('\\') {
                if !prefix.is_empty() {
                    prefix.push('\\');
                }
                prefix.push_str(segment);
                self.keys
                    .entry((hive, view, prefix.to_lowercase()))
                    .or_insert_with(|| MemoryKey {
                        path: prefix.clone(),
                        values: BTreeMap::new(),
                    });
            }
            self
        }

        /// Set a string value, creating the key as needed.
        pub(crate) fn set(&mut self, hive: Hive, view: View, path: &str, name: &str, value: &str) -> &mut Self {
            self.insert_key(hive, view, path);
            let folded = clean_path(path).to_lowercase();
            if let Some(key) = self.keys.get_mut(&(hive, view, folded)) {
                key.values.insert(name.to_lowercase(), value.to_string());
            }
            self
        }
    }

    impl RegistryReader for MemoryRegistry {
        fn subkey_names(&self, hive: Hive, view: View, path: &str) -> Vec<String> {
            let parent = format!("{}\\", clean_path(path).to_lowercase());
            self.keys
                .iter()
                .filter(|((h, v, folded), _)| {
                    *h == hive
                        && *v == view
                        && folded
                            .strip_prefix(&parent)
                            .is_some_and(|rest| !rest.is_empty() && !rest.contains('\\'))
                })
                .filter_map(|(_, key)| key.path.rsplit('\\').next().map(str::to_string))
                .collect()
        }

        fn string_value(&self, hive: Hive, view: View, path: &str, name: &str) -> Option<String> {
            self.keys
                .get(&(hive, view, clean_path(path).to_lowercase()))
                .and_then(|key| key.values.get(&name.to_lowercase()))
                .cloned()
        }
    }

    fn clean_path(path: &str) -> String {
        path.trim_matches('\\').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{testing::MemoryRegistry, *};

    #[test]
    fn memory_registry_is_case_insensitive() {
        let mut registry = MemoryRegistry::new();
        registry
            .set(Hive::LocalMachine, View::Registry64, r"SOFTWARE\GOG.com\Games\1207658924", "gameName", "Unreal")
            .set(Hive::LocalMachine, View::Registry64, r"SOFTWARE\GOG.com\Games\1495134320", "gameName", "Witcher");

        let mut names =
            registry.subkey_names(Hive::LocalMachine, View::Registry64, r"software\gog.com\games");
        names.sort();
        assert_eq!(names, vec!["1207658924", "1495134320"]);
        assert_eq!(
            registry.string_value(
                Hive::LocalMachine,
                View::Registry64,
                r"SOFTWARE\GOG.COM\Games\1207658924",
                "GAMENAME"
            ),
            Some("Unreal".to_string())
        );
        assert!(registry
            .subkey_names(Hive::LocalMachine, View::Registry32, r"SOFTWARE\GOG.com\Games")
            .is_empty());
    }

    #[test]
    fn any_view_falls_back_to_32_bit() {
        let mut registry = MemoryRegistry::new();
        registry.set(Hive::LocalMachine, View::Registry32, r"SOFTWARE\Riot Games\VALORANT", "InstallPath", "  D:\\Riot  ");
        assert_eq!(
            registry.any_view(Hive::LocalMachine, r"SOFTWARE\Riot Games\VALORANT", "InstallPath"),
            Some("D:\\Riot".to_string())
        );
    }

    #[test]
    fn extracts_executables_from_command_lines() {
        assert_eq!(
            extract_exe_path(r#""C:\Riot Games\Riot Client\RiotClientServices.exe" --uninstall"#),
            Some(r"C:\Riot Games\Riot Client\RiotClientServices.exe".to_string())
        );
        assert_eq!(
            extract_exe_path(r"C:\Games\unins000.EXE /SILENT"),
            Some(r"C:\Games\unins000.EXE".to_string())
        );
        assert_eq!(extract_exe_path("msiexec /x {GUID}"), None);
        assert_eq!(extract_exe_path(r#""""#), None);
    }
}
