//! # lagswitch-core
//!
//! Shared library for LagSwitch containing the toggle state model, the pf
//! rule rendering, the hotkey translation table, and the wire protocol spoken
//! between the unprivileged listener and the privileged helper.
//!
//! This crate has zero dependencies on OS APIs, firewall tooling, or
//! subprocesses.  Everything here can be unit-tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! LagSwitch simulates "lag" in a game by cutting outbound UDP traffic in the
//! game's port range whenever the user presses a global hotkey.  The actual
//! blocking is done by the macOS packet filter (`pf`): a named *anchor* holds
//! either zero rules (traffic flows) or one `block` rule (traffic is dropped).
//!
//! This crate (`lagswitch-core`) is the shared foundation.  It defines:
//!
//! - **`domain`** – The on/off [`LagState`], the on-disk [`StateRecord`] that
//!   persists it, and the pf text that must be written for each state.
//!
//! - **`keymap`** – The supported hotkeys and their macOS virtual keycodes.
//!
//! - **`protocol`** – Newline-delimited JSON messages exchanged with the
//!   privileged helper process over its stdin/stdout pipes.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::lag_state::{LagState, StateRecord, STATE_RECORD_VERSION};
pub use domain::pf_rules::{AnchorDeclaration, BlockRule, PortRange, RuleError};
pub use keymap::{Hotkey, KeyPress};
pub use protocol::codec::{decode_line, encode_line, ProtocolError};
pub use protocol::messages::{HelperCommand, HelperReply, HelperRequest};
