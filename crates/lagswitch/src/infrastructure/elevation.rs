//! `sudo` integration.
//!
//! The listener asks for the password exactly once, at startup, with
//! `sudo -v`.  Every later elevated launch uses `sudo -n` (non-interactive),
//! so a hotkey press can never hang on a hidden password prompt; if the
//! cached credential is gone the launch fails instead.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use thiserror::Error;

use crate::config::SUDO;

/// Error type for elevation requests.
#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("failed to run sudo: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("sudo authentication failed ({0})")]
    Denied(String),
}

/// Validates (and caches) the user's sudo credentials, prompting on the
/// terminal if needed.
pub fn preauthenticate() -> Result<(), ElevationError> {
    let status = std::process::Command::new(SUDO)
        .arg("-v")
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(ElevationError::Spawn)?;
    if status.success() {
        Ok(())
    } else {
        Err(ElevationError::Denied(status.to_string()))
    }
}

/// Arguments for `sudo` that re-run this executable in `mode_flag` without
/// prompting.
pub fn self_invocation_args(exe: &Path, mode_flag: &str) -> Vec<OsString> {
    vec![
        OsString::from("-n"),
        exe.as_os_str().to_os_string(),
        OsString::from(mode_flag),
    ]
}

/// Builds the async command that re-runs this executable elevated.
pub fn elevated_self_command(exe: &Path, mode_flag: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(SUDO);
    cmd.args(self_invocation_args(exe, mode_flag));
    cmd
}
