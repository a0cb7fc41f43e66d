//! Resolved launch targets and the OS process launcher.

use std::{fmt, path::PathBuf, process::Command};

use thiserror::Error;
use tracing::{debug, info};

use crate::models::Platform;

/// How a game is started once its platform has resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// A URI handled by the platform's registered protocol handler.
    Uri(String),
    /// An executable started directly.
    Command {
        /// Executable path or name on `PATH`.
        program: PathBuf,
        /// Arguments passed verbatim.
        args: Vec<String>,
        /// Working directory, usually the install directory.
        working_dir: Option<PathBuf>,
    },
}

impl LaunchTarget {
    /// Command target without a working directory.
    pub fn command(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self::Command {
            program: program.into(),
            args,
            working_dir: None,
        }
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchTarget::Uri(uri) => f.write_str(uri),
            LaunchTarget::Command { program, args, .. } => {
                write!(f, "{}", program.display())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// Why a launch did not happen.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The platform could not produce a target for the id.
    #[error("cannot launch {platform}:{id}: {reason}")]
    Unresolved {
        /// Platform of the entry.
        platform: Platform,
        /// Platform-native id.
        id: String,
        /// Human-readable cause.
        reason: String,
    },
    /// The OS refused to start the target.
    #[error("failed to start {target}: {source}")]
    Spawn {
        /// Rendered target.
        target: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Shorthand for [`LaunchError::Unresolved`].
    pub fn unresolved(platform: Platform, id: &str, reason: impl Into<String>) -> Self {
        Self::Unresolved {
            platform,
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fire-and-forget process launcher.
pub trait Launcher {
    /// Start the target without waiting for it to exit.
    fn launch(&self, target: &LaunchTarget) -> Result<(), LaunchError>;
}

/// Launches through the host operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, target: &LaunchTarget) -> Result<(), LaunchError> {
        let mut command = match target {
            LaunchTarget::Uri(uri) => uri_opener(uri),
            LaunchTarget::Command {
                program,
                args,
                working_dir,
            } => {
                let mut command = Command::new(program);
                command.args(args);
                if let Some(dir) = working_dir.as_ref().filter(|dir| dir.is_dir()) {
                    command.current_dir(dir);
                }
                command
            }
        };

        debug!("launching {target}");
        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            target: target.to_string(),
            source,
        })?;
        info!("launched {target} (pid {})", child.id());

        // Reap the opener or game once it exits.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

#[cfg(windows)]
fn uri_opener(uri: &str) -> Command {
    // `cmd /C start` would split on `&` inside query strings.
    let mut command = Command::new("rundll32");
    command.arg("url.dll,FileProtocolHandler").arg(uri);
    command
}

#[cfg(target_os = "macos")]
fn uri_opener(uri: &str) -> Command {
    let mut command = Command::new("open");
    command.arg(uri);
    command
}

#[cfg(all(unix, not(target_os = "macos")))]
fn uri_opener(uri: &str) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(uri);
    command
}
