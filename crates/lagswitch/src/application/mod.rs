//! Application layer use cases for LagSwitch.
//!
//! # What is the "application" layer? (for beginners)
//!
//! Use cases in this layer orchestrate the domain types from
//! `lagswitch-core` to fulfil one user goal each.  They talk to the outside
//! world only through narrow seams (the [`PacketFilter`] trait, the
//! [`StateStore`], the [`Toggler`] trait), so every use case can be driven in
//! tests against a scratch directory and a recording firewall.
//!
//! # Sub-modules
//!
//! - **`install_firewall`** – One-time setup: append the anchor lines to
//!   `pf.conf`, create the anchor file, reload and enable pf.
//!
//! - **`toggle_lag`** – Flip the block on or off: rewrite the anchor file,
//!   update the state file, reload the anchor.  Runs with root privileges in
//!   the worker and the helper.
//!
//! - **`listen_hotkey`** – Unprivileged loop that turns hotkey presses into
//!   toggle requests and restores the off state on shutdown.
//!
//! [`PacketFilter`]: crate::infrastructure::firewall::PacketFilter
//! [`StateStore`]: crate::infrastructure::storage::StateStore
//! [`Toggler`]: listen_hotkey::Toggler

pub mod install_firewall;
pub mod listen_hotkey;
pub mod toggle_lag;
