//! Lag state and the record persisted while the block is active.
//!
//! The state file's *existence* is the flag: present means active.  Its
//! contents are a small [`StateRecord`] that says when and by whom the block
//! was switched on.  A file whose contents cannot be parsed still counts as
//! active.

use serde::{Deserialize, Serialize};

/// Current schema version written into [`StateRecord::version`].
pub const STATE_RECORD_VERSION: u32 = 1;

/// Whether the UDP block is currently in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LagState {
    /// No rule loaded; traffic flows normally.
    #[default]
    Inactive,
    /// The block rule is loaded; outbound game traffic is dropped.
    Active,
}

impl LagState {
    /// Returns the opposite state.  One toggle always produces exactly one flip.
    pub fn toggled(self) -> Self {
        match self {
            LagState::Inactive => LagState::Active,
            LagState::Active => LagState::Inactive,
        }
    }

    pub fn is_active(self) -> bool {
        self == LagState::Active
    }

    /// Human-readable label used in console output and logs.
    pub fn label(self) -> &'static str {
        match self {
            LagState::Inactive => "inactive",
            LagState::Active => "active",
        }
    }
}

impl std::fmt::Display for LagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Contents of the state file while the block is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Schema version; see [`STATE_RECORD_VERSION`].
    pub version: u32,
    /// Unix timestamp (seconds) at which the block was switched on.
    pub activated_at: u64,
    /// PID of the process that switched the block on.
    pub activated_by: u32,
}

impl StateRecord {
    /// Creates a record for an activation happening now.
    pub fn new(activated_at: u64, activated_by: u32) -> Self {
        Self {
            version: STATE_RECORD_VERSION,
            activated_at,
            activated_by,
        }
    }

    /// Returns `true` if this binary understands the record's schema.
    pub fn is_supported(&self) -> bool {
        self.version == STATE_RECORD_VERSION
    }

    /// Seconds the block has been active at `now`; saturates at zero when the
    /// clock moved backwards.
    pub fn active_for_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.activated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggled_flips_both_ways() {
        assert_eq!(LagState::Inactive.toggled(), LagState::Active);
        assert_eq!(LagState::Active.toggled(), LagState::Inactive);
    }

    #[test]
    fn test_n_toggles_from_inactive_is_active_iff_n_odd() {
        let mut state = LagState::default();
        for n in 1..=9u32 {
            state = state.toggled();
            assert_eq!(state.is_active(), n % 2 == 1, "after {n} toggles");
        }
    }

    #[test]
    fn test_default_is_inactive() {
        assert_eq!(LagState::default(), LagState::Inactive);
    }

    #[test]
    fn test_display_uses_lowercase_label() {
        assert_eq!(LagState::Active.to_string(), "active");
        assert_eq!(LagState::Inactive.to_string(), "inactive");
    }

    #[test]
    fn test_record_new_uses_current_version() {
        let record = StateRecord::new(1_700_000_000, 4242);
        assert_eq!(record.version, STATE_RECORD_VERSION);
        assert!(record.is_supported());
    }

    #[test]
    fn test_record_with_future_version_is_unsupported() {
        let record = StateRecord {
            version: STATE_RECORD_VERSION + 1,
            activated_at: 0,
            activated_by: 1,
        };
        assert!(!record.is_supported());
    }

    #[test]
    fn test_active_for_saturates_on_clock_skew() {
        let record = StateRecord::new(100, 1);
        assert_eq!(record.active_for_secs(160), 60);
        assert_eq!(record.active_for_secs(50), 0);
    }

    #[test]
    fn test_record_parses_from_toml() {
        let text = "version = 1\nactivated_at = 1700000000\nactivated_by = 77\n";
        let record: StateRecord = toml::from_str(text).expect("valid record");
        assert_eq!(record, StateRecord::new(1_700_000_000, 77));
    }
}
