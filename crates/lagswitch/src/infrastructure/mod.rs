//! Infrastructure layer for LagSwitch.
//!
//! Contains OS-facing adapters: privilege checks, `sudo` elevation, `pfctl`
//! control, the state file, the key-down event tap, and the privileged
//! helper process with its pipe protocol.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lagswitch_core`.  The application layer only reaches in here for the
//! seams it drives ([`firewall::PacketFilter`], [`storage::StateStore`]).

pub mod elevation;
pub mod firewall;
pub mod helper;
pub mod input_capture;
pub mod privilege;
pub mod storage;
