//! ToggleLagUseCase: flip the UDP block on or off.
//!
//! Each call runs this sequence while holding the state lock:
//!
//! ```text
//! lock ──► load state ──► write anchor file ──► write/remove state file ──► pfctl -a <anchor> -f <file>
//! ```
//!
//! The anchor file is written before the state file: if the process dies in
//! between, the state file still describes what pf has loaded.  Any failure
//! aborts the sequence; nothing is rolled back.

use std::path::PathBuf;
use std::sync::Arc;

use lagswitch_core::{BlockRule, LagState};
use thiserror::Error;

use crate::config::LagSwitchConfig;
use crate::infrastructure::firewall::{FirewallError, PacketFilter};
use crate::infrastructure::storage::{unix_now, write_atomic, StateStore, StoreError};

/// Error type for the toggle use case.
#[derive(Debug, Error)]
pub enum ToggleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to write anchor file {path}: {source}")]
    AnchorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Firewall(#[from] FirewallError),
}

/// Flips the block and keeps the anchor file and state file in agreement.
pub struct ToggleLagUseCase {
    store: StateStore,
    anchor_name: String,
    anchor_file: PathBuf,
    rule: BlockRule,
    filter: Arc<dyn PacketFilter>,
    pid: u32,
}

impl ToggleLagUseCase {
    pub fn new(config: &LagSwitchConfig, filter: Arc<dyn PacketFilter>, pid: u32) -> Self {
        Self {
            store: StateStore::new(config.state_file.clone()),
            anchor_name: config.anchor.name().to_string(),
            anchor_file: config.anchor_file.clone(),
            rule: config.rule,
            filter,
            pid,
        }
    }

    /// Performs exactly one toggle and returns the new state.
    pub fn toggle(&self) -> Result<LagState, ToggleError> {
        let _lock = self.store.lock()?;
        let next = self.store.load()?.toggled();
        self.apply(next)?;
        Ok(next)
    }

    /// Forces the inactive state.  Does nothing (and does not touch pf) when
    /// the block is already off.
    pub fn deactivate(&self) -> Result<LagState, ToggleError> {
        let _lock = self.store.lock()?;
        if self.store.load()? == LagState::Inactive {
            return Ok(LagState::Inactive);
        }
        self.apply(LagState::Inactive)?;
        Ok(LagState::Inactive)
    }

    /// Returns the current state without changing it.
    pub fn current(&self) -> Result<LagState, ToggleError> {
        Ok(self.store.load()?)
    }

    fn apply(&self, next: LagState) -> Result<(), ToggleError> {
        let contents = self.rule.anchor_contents(next);
        write_atomic(&self.anchor_file, contents.as_bytes()).map_err(|source| {
            ToggleError::AnchorWrite {
                path: self.anchor_file.clone(),
                source,
            }
        })?;

        match next {
            LagState::Active => {
                self.store.activate(self.pid)?;
            }
            LagState::Inactive => {
                if let Some(record) = self.store.record()? {
                    tracing::debug!(
                        active_secs = record.active_for_secs(unix_now()),
                        activated_by = record.activated_by,
                        "ending lag period"
                    );
                }
                self.store.deactivate()?;
            }
        }

        self.filter.reload_anchor(&self.anchor_name, &self.anchor_file)?;
        tracing::info!(state = %next, anchor = %self.anchor_name, "lag state changed");
        Ok(())
    }
}
