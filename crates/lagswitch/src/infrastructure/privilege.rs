//! Effective-uid checks and home directory resolution.
//!
//! Setup, the worker, and the helper must run as root because they rewrite
//! files under `/etc` and call `pfctl`.  The listener must *not* run as root:
//! it only needs to observe key presses, and it asks for elevation through
//! `sudo` when it has to.

use std::path::PathBuf;

use thiserror::Error;

/// Privilege level of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Effective uid 0.
    Elevated,
    Unprivileged,
}

/// Raised when a mode is entered with the wrong privilege level.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrivilegeError {
    #[error("{mode} must be run with sudo")]
    NotElevated { mode: &'static str },

    #[error("{mode} must not be run with sudo")]
    Elevated { mode: &'static str },
}

impl Privilege {
    /// Reads the effective uid of this process.
    pub fn current() -> Self {
        #[cfg(unix)]
        {
            if nix::unistd::geteuid().is_root() {
                Privilege::Elevated
            } else {
                Privilege::Unprivileged
            }
        }

        #[cfg(not(unix))]
        {
            Privilege::Unprivileged
        }
    }

    /// Fails unless the process is elevated.
    pub fn require_elevated(self, mode: &'static str) -> Result<(), PrivilegeError> {
        match self {
            Privilege::Elevated => Ok(()),
            Privilege::Unprivileged => Err(PrivilegeError::NotElevated { mode }),
        }
    }

    /// Fails if the process is elevated.
    pub fn require_unprivileged(self, mode: &'static str) -> Result<(), PrivilegeError> {
        match self {
            Privilege::Unprivileged => Ok(()),
            Privilege::Elevated => Err(PrivilegeError::Elevated { mode }),
        }
    }
}

/// Picks the home directory that owns the state file.
///
/// Under `sudo` the process runs as root but the state belongs to the user
/// who invoked it, so `SUDO_USER` is looked up first.  Otherwise `$HOME`
/// is used.
pub fn home_for(
    privilege: Privilege,
    sudo_user: Option<&str>,
    home_env: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Option<PathBuf> {
    if privilege == Privilege::Elevated {
        if let Some(user) = sudo_user.filter(|u| !u.is_empty() && *u != "root") {
            if let Some(dir) = lookup(user) {
                return Some(dir);
            }
            tracing::warn!(user, "SUDO_USER not found in user database; falling back to HOME");
        }
    }
    home_env.filter(|h| !h.as_os_str().is_empty())
}

/// Resolves the invoking user's home directory for this process.
pub fn invoking_user_home() -> Option<PathBuf> {
    let sudo_user = std::env::var("SUDO_USER").ok();
    home_for(
        Privilege::current(),
        sudo_user.as_deref(),
        std::env::var_os("HOME").map(PathBuf::from),
        lookup_user_home,
    )
}

fn lookup_user_home(name: &str) -> Option<PathBuf> {
    #[cfg(unix)]
    {
        nix::unistd::User::from_name(name).ok().flatten().map(|u| u.dir)
    }

    #[cfg(not(unix))]
    {
        let _ = name;
        None
    }
}

/// PID of this process, recorded in the state file on activation.
pub fn current_pid() -> u32 {
    std::process::id()
}
