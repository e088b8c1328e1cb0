//! Packet filter control.
//!
//! The toggle and install use cases only ever need three things from the
//! firewall: reload the full ruleset from a file, reload one anchor from a
//! file, and make sure pf is enabled.  [`PacketFilter`] captures exactly that
//! seam; [`PfCtl`] implements it by running `pfctl`, and
//! [`mock::RecordingPacketFilter`] records calls for tests.
//!
//! # What is an anchor? (for beginners)
//!
//! A pf *anchor* is a named sub-ruleset.  `pf.conf` declares it once
//! (`anchor "roblox_block"`), and from then on its rules can be replaced with
//! `pfctl -a roblox_block -f <file>` without touching the main ruleset.  That
//! makes each toggle a cheap, local reload.

pub mod mock;

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;

/// Error type for firewall control operations.
#[derive(Debug, Error)]
pub enum FirewallError {
    /// The control binary could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The control binary ran and reported failure.
    #[error("`{command}` failed with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Operations the use cases need from the OS packet filter.
#[cfg_attr(test, mockall::automock)]
pub trait PacketFilter: Send + Sync {
    /// Reloads the complete ruleset from `conf` (`pfctl -f <conf>`).
    fn reload_ruleset(&self, conf: &Path) -> Result<(), FirewallError>;

    /// Replaces the rules of `anchor` with those in `file` (`pfctl -a <anchor> -f <file>`).
    fn reload_anchor(&self, anchor: &str, file: &Path) -> Result<(), FirewallError>;

    /// Enables the packet filter; already-enabled is success.
    fn enable(&self) -> Result<(), FirewallError>;
}

/// [`PacketFilter`] backed by the `pfctl` command-line tool.
#[derive(Debug, Clone)]
pub struct PfCtl {
    program: PathBuf,
}

impl PfCtl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output, FirewallError> {
        let program = self.program.display().to_string();
        tracing::debug!(%program, ?args, "running packet filter command");
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| FirewallError::Spawn { program, source })
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    fn check(&self, args: &[&str]) -> Result<(), FirewallError> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        Err(FirewallError::CommandFailed {
            command: self.command_line(args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Default for PfCtl {
    fn default() -> Self {
        Self::new(crate::config::PFCTL)
    }
}

impl PacketFilter for PfCtl {
    fn reload_ruleset(&self, conf: &Path) -> Result<(), FirewallError> {
        let conf = conf.to_string_lossy();
        self.check(&["-f", conf.as_ref()])
    }

    fn reload_anchor(&self, anchor: &str, file: &Path) -> Result<(), FirewallError> {
        let file = file.to_string_lossy();
        self.check(&["-a", anchor, "-f", file.as_ref()])
    }

    fn enable(&self) -> Result<(), FirewallError> {
        let args = ["-e"];
        let output = self.run(&args)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() || is_already_enabled(&stderr) {
            return Ok(());
        }
        Err(FirewallError::CommandFailed {
            command: self.command_line(&args),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// `pfctl -e` exits 1 with "pf already enabled" when pf is running.
fn is_already_enabled(stderr: &str) -> bool {
    stderr.contains("already enabled")
}
