//! Domain entities for LagSwitch.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//!
//! # What lives here? (for beginners)
//!
//! The whole program revolves around one boolean: "is the block currently
//! active?".  Two artifacts on disk must always agree with that boolean:
//!
//! - the **state record** in the user's home directory (present iff active);
//! - the **anchor rule file** under `/etc/pf.anchors` (empty iff inactive).
//!
//! The domain types decide *what* those artifacts contain.  Writing them, and
//! asking `pf` to reload them, is the job of the infrastructure layer in the
//! `lagswitch` crate.

/// On/off state and its persisted record.
pub mod lag_state;

/// pf rule text and `pf.conf` anchor lines.
pub mod pf_rules;
