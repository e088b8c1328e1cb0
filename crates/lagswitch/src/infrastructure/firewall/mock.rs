//! Recording packet filter for tests.
//!
//! Allows tests to run the install and toggle use cases end-to-end without
//! root or `pfctl`.  Every call is recorded; a failure can be armed for the
//! next anchor reload.

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use super::{FirewallError, PacketFilter};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallCall {
    ReloadRuleset(PathBuf),
    ReloadAnchor { anchor: String, file: PathBuf },
    Enable,
}

/// A [`PacketFilter`] that records calls instead of touching pf.
#[derive(Default)]
pub struct RecordingPacketFilter {
    calls: Mutex<Vec<FirewallCall>>,
    fail_next_anchor_reload: AtomicBool,
}

impl RecordingPacketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all calls so far, in order.
    pub fn calls(&self) -> Vec<FirewallCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Makes the next `reload_anchor` call fail.
    pub fn fail_next_anchor_reload(&self) {
        self.fail_next_anchor_reload.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: FirewallCall) {
        self.calls.lock().expect("lock poisoned").push(call);
    }
}

impl PacketFilter for RecordingPacketFilter {
    fn reload_ruleset(&self, conf: &Path) -> Result<(), FirewallError> {
        self.record(FirewallCall::ReloadRuleset(conf.to_path_buf()));
        Ok(())
    }

    fn reload_anchor(&self, anchor: &str, file: &Path) -> Result<(), FirewallError> {
        self.record(FirewallCall::ReloadAnchor {
            anchor: anchor.to_string(),
            file: file.to_path_buf(),
        });
        if self.fail_next_anchor_reload.swap(false, Ordering::SeqCst) {
            return Err(FirewallError::CommandFailed {
                command: format!("pfctl -a {anchor} -f {}", file.display()),
                status: "exit status: 1".to_string(),
                stderr: "armed failure".to_string(),
            });
        }
        Ok(())
    }

    fn enable(&self) -> Result<(), FirewallError> {
        self.record(FirewallCall::Enable);
        Ok(())
    }
}
