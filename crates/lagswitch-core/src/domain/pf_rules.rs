//! pf rule text for the lag anchor and the `pf.conf` lines that load it.
//!
//! Two pieces of text matter:
//!
//! ```text
//! /etc/pf.conf (appended once by setup):
//!     anchor "roblox_block"
//!     load anchor "roblox_block" from "/etc/pf.anchors/com.miles5746.roblox"
//!
//! /etc/pf.anchors/com.miles5746.roblox (rewritten on every toggle):
//!     <empty>                                                    -- inactive
//!     block out quick proto udp from any to any port 49152:65535 -- active
//! ```

use thiserror::Error;

use super::lag_state::LagState;

/// Errors raised while building rule text from untrusted parts.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    /// Anchor names are quoted in pf.conf, so quotes and whitespace are rejected.
    #[error("invalid anchor name {0:?}")]
    InvalidAnchorName(String),

    /// The anchor file must be an absolute path without quotes.
    #[error("invalid anchor file path {0:?}")]
    InvalidAnchorFile(String),
}

/// An inclusive range of UDP destination ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// The IANA dynamic/private range used by the game's voice and state traffic.
    pub const DYNAMIC: PortRange = PortRange {
        start: 49152,
        end: 65535,
    };
}

/// The single rule loaded into the anchor while lag is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRule {
    pub ports: PortRange,
}

impl BlockRule {
    pub fn new(ports: PortRange) -> Self {
        Self { ports }
    }

    /// Renders the pf rule line, newline-terminated.
    pub fn render(&self) -> String {
        format!(
            "block out quick proto udp from any to any port {}:{}\n",
            self.ports.start, self.ports.end
        )
    }

    /// Anchor file contents for `state`: the rule when active, empty otherwise.
    pub fn anchor_contents(&self, state: LagState) -> String {
        match state {
            LagState::Active => self.render(),
            LagState::Inactive => String::new(),
        }
    }
}

impl Default for BlockRule {
    fn default() -> Self {
        Self::new(PortRange::DYNAMIC)
    }
}

/// The named anchor and the file it is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorDeclaration {
    name: String,
    file: String,
}

impl AnchorDeclaration {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Result<Self, RuleError> {
        let name = name.into();
        let file = file.into();
        if name.is_empty() || name.chars().any(|c| c == '"' || c.is_whitespace()) {
            return Err(RuleError::InvalidAnchorName(name));
        }
        if !file.starts_with('/') || file.contains('"') || file.contains('\n') {
            return Err(RuleError::InvalidAnchorFile(file));
        }
        Ok(Self { name, file })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// `anchor "<name>"`
    pub fn anchor_line(&self) -> String {
        format!("anchor \"{}\"", self.name)
    }

    /// `load anchor "<name>" from "<file>"`
    pub fn load_line(&self) -> String {
        format!("load anchor \"{}\" from \"{}\"", self.name, self.file)
    }

    /// Returns `true` when `conf` already contains both lines.
    ///
    /// Lines are compared after trimming, so a commented-out copy does not count.
    pub fn is_installed_in(&self, conf: &str) -> bool {
        let anchor = self.anchor_line();
        let load = self.load_line();
        let has = |wanted: &str| conf.lines().any(|line| line.trim() == wanted);
        has(&anchor) && has(&load)
    }

    /// Text to append to `conf`, or `None` if both lines are already present.
    ///
    /// When only one of the two lines is present both are appended again; pf
    /// accepts the duplicate and the second run of setup becomes a no-op.
    pub fn plan_append(&self, conf: &str) -> Option<String> {
        if self.is_installed_in(conf) {
            return None;
        }
        Some(format!("\n{}\n{}\n", self.anchor_line(), self.load_line()))
    }
}
