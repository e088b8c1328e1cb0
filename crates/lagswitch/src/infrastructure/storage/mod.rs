//! Storage infrastructure: the state file and atomic file replacement.
//!
//! This module provides a thin adapter between the toggle use case and the
//! file system:
//!
//! - [`state_store`] owns the state file in the user's home directory and the
//!   lock that serializes toggles across processes.
//! - [`atomic`] replaces a file's contents with write-to-temp plus rename, so
//!   readers (including `pfctl`) never observe a half-written file.

pub mod atomic;
pub mod state_store;

pub use atomic::write_atomic;
pub use state_store::{unix_now, StateLock, StateStore, StoreError};
