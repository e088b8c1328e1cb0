//! Fixed runtime constants for LagSwitch.
//!
//! There is no configuration file: the firewall paths, anchor name, blocked
//! port range, and hotkey are constants shared with existing installs.  They
//! are collected here and resolved once into a [`LagSwitchConfig`] so the
//! rest of the code never reaches for a global.
//!
//! Log verbosity is the one runtime knob; it is read from `RUST_LOG` in
//! `main`.

use std::path::{Path, PathBuf};

use lagswitch_core::{AnchorDeclaration, BlockRule, Hotkey, RuleError};
use thiserror::Error;

use crate::infrastructure::privilege;

/// Tag used in the anchor file and state file names.
pub const AUTHOR: &str = "miles5746";

/// Main pf configuration file that receives the anchor lines.
pub const PF_CONF: &str = "/etc/pf.conf";

/// Name of the pf anchor holding the block rule.
pub const ANCHOR_NAME: &str = "roblox_block";

/// File the anchor is loaded from.
pub const ANCHOR_FILE: &str = "/etc/pf.anchors/com.miles5746.roblox";

/// State file name, relative to the invoking user's home directory.
pub const STATE_FILE_NAME: &str = ".miles5746_lag_state";

/// Global hotkey that toggles the block.
pub const HOTKEY: Hotkey = Hotkey::F6;

/// Firewall control binary.
pub const PFCTL: &str = "pfctl";

/// Elevation binary.
pub const SUDO: &str = "sudo";

/// How long the listener waits for the helper's `ready` line (seconds).
pub const HELPER_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// How long the listener waits for each helper reply (seconds).
pub const HELPER_REPLY_TIMEOUT_SECS: u64 = 10;

/// How long the listener waits for a one-shot worker (seconds).
pub const WORKER_TIMEOUT_SECS: u64 = 30;

/// Capacity of the channel between the key bridge and the listener loop.
pub const KEY_EVENT_BUFFER: usize = 32;

/// Errors raised while resolving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `SUDO_USER` nor `HOME` yielded a home directory.
    #[error("could not determine the user's home directory")]
    NoHomeDir,

    /// A path constant could not be expressed as UTF-8 for pf.conf.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// The anchor declaration is not valid pf syntax.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// Resolved configuration shared by every mode.
#[derive(Debug, Clone)]
pub struct LagSwitchConfig {
    /// Main pf configuration file.
    pub pf_conf: PathBuf,
    /// Anchor name plus the file it is loaded from.
    pub anchor: AnchorDeclaration,
    /// Same file as `anchor.file()`, as a path.
    pub anchor_file: PathBuf,
    /// State file whose existence means "block active".
    pub state_file: PathBuf,
    pub hotkey: Hotkey,
    pub rule: BlockRule,
}

impl LagSwitchConfig {
    /// Resolves the production configuration for the current process.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] when the invoking user's home
    /// directory cannot be determined.
    pub fn resolve() -> Result<Self, ConfigError> {
        let home = privilege::invoking_user_home().ok_or(ConfigError::NoHomeDir)?;
        Self::with_paths(
            Path::new(PF_CONF),
            Path::new(ANCHOR_FILE),
            &home.join(STATE_FILE_NAME),
        )
    }

    /// Builds a configuration around explicit paths; used by `resolve` and by
    /// tests that point everything at a scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonUtf8Path`] or [`ConfigError::Rule`] if the
    /// anchor file cannot be written into pf.conf syntax.
    pub fn with_paths(
        pf_conf: &Path,
        anchor_file: &Path,
        state_file: &Path,
    ) -> Result<Self, ConfigError> {
        let anchor_str = anchor_file
            .to_str()
            .ok_or_else(|| ConfigError::NonUtf8Path(anchor_file.to_path_buf()))?;
        let anchor = AnchorDeclaration::new(ANCHOR_NAME, anchor_str)?;
        Ok(Self {
            pf_conf: pf_conf.to_path_buf(),
            anchor,
            anchor_file: anchor_file.to_path_buf(),
            state_file: state_file.to_path_buf(),
            hotkey: HOTKEY,
            rule: BlockRule::default(),
        })
    }
}
