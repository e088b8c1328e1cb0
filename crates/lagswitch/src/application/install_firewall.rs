//! InstallFirewallUseCase: one-time pf configuration.
//!
//! ```text
//! read /etc/pf.conf
//!   ├─ both anchor lines present ──► skip
//!   └─ otherwise ─────────────────► append "\nanchor …\nload anchor … from …\n"
//! mkdir -p /etc/pf.anchors
//! create the anchor file if absent (never truncated)
//! pfctl -f /etc/pf.conf
//! pfctl -e
//! ```
//!
//! Running it twice leaves `pf.conf` byte-for-byte unchanged the second time.
//! It must be re-run after anything resets `pf.conf` (macOS upgrades do).

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lagswitch_core::AnchorDeclaration;
use thiserror::Error;

use crate::config::LagSwitchConfig;
use crate::infrastructure::firewall::{FirewallError, PacketFilter};

/// Error type for the install use case.  Every variant is fatal.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Firewall(#[from] FirewallError),
}

/// What the install run actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    /// The anchor lines were appended to pf.conf on this run.
    pub rules_added: bool,
    /// The anchor file did not exist and was created empty.
    pub anchor_created: bool,
}

/// Progress reported while [`InstallFirewallUseCase::run_with_progress`] works.
///
/// Each action is announced before it starts and confirmed once it is done,
/// so a failure is shown right after the step that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    RulesPresent,
    AddingRules,
    RulesAdded,
    PreparingAnchorFile,
    AnchorFileReady { created: bool },
    ReloadingFirewall,
    FirewallReloaded,
}

/// Installs the lag anchor into the system pf configuration.
pub struct InstallFirewallUseCase {
    pf_conf: PathBuf,
    anchor: AnchorDeclaration,
    anchor_file: PathBuf,
    filter: Arc<dyn PacketFilter>,
}

impl InstallFirewallUseCase {
    pub fn new(config: &LagSwitchConfig, filter: Arc<dyn PacketFilter>) -> Self {
        Self {
            pf_conf: config.pf_conf.clone(),
            anchor: config.anchor.clone(),
            anchor_file: config.anchor_file.clone(),
            filter,
        }
    }

    /// Runs the installation without progress reporting.
    ///
    /// # Errors
    ///
    /// See [`run_with_progress`](Self::run_with_progress).
    pub fn run(&self) -> Result<InstallReport, InstallError> {
        self.run_with_progress(|_| {})
    }

    /// Runs the installation, calling `progress` around each action.
    ///
    /// # Errors
    ///
    /// [`InstallError::Io`] for any file system failure and
    /// [`InstallError::Firewall`] if reloading or enabling pf fails.  Nothing
    /// is retried or rolled back.
    pub fn run_with_progress(
        &self,
        mut progress: impl FnMut(InstallStep),
    ) -> Result<InstallReport, InstallError> {
        let rules_added = self.ensure_anchor_lines(&mut progress)?;

        progress(InstallStep::PreparingAnchorFile);
        let anchor_created = self.ensure_anchor_file()?;
        progress(InstallStep::AnchorFileReady {
            created: anchor_created,
        });

        progress(InstallStep::ReloadingFirewall);
        tracing::info!(conf = %self.pf_conf.display(), "reloading pf ruleset");
        self.filter.reload_ruleset(&self.pf_conf)?;
        self.filter.enable()?;
        progress(InstallStep::FirewallReloaded);

        Ok(InstallReport {
            rules_added,
            anchor_created,
        })
    }

    fn ensure_anchor_lines(
        &self,
        progress: &mut impl FnMut(InstallStep),
    ) -> Result<bool, InstallError> {
        let conf = fs::read_to_string(&self.pf_conf).map_err(|e| io_err(&self.pf_conf, e))?;
        let Some(block) = self.anchor.plan_append(&conf) else {
            tracing::info!(anchor = self.anchor.name(), "anchor lines already present");
            progress(InstallStep::RulesPresent);
            return Ok(false);
        };

        progress(InstallStep::AddingRules);
        tracing::info!(anchor = self.anchor.name(), "appending anchor lines");
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.pf_conf)
            .map_err(|e| io_err(&self.pf_conf, e))?;
        file.write_all(block.as_bytes())
            .map_err(|e| io_err(&self.pf_conf, e))?;
        progress(InstallStep::RulesAdded);
        Ok(true)
    }

    fn ensure_anchor_file(&self) -> Result<bool, InstallError> {
        if let Some(dir) = self.anchor_file.parent() {
            fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        if self.anchor_file.exists() {
            return Ok(false);
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.anchor_file)
            .map_err(|e| io_err(&self.anchor_file, e))?;
        tracing::info!(file = %self.anchor_file.display(), "created empty anchor file");
        Ok(true)
    }
}

fn io_err(path: &Path, source: io::Error) -> InstallError {
    InstallError::Io {
        path: path.to_path_buf(),
        source,
    }
}
