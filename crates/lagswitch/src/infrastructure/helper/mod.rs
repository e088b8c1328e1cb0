//! Privileged helper process and the listener-side toggle strategies.
//!
//! # How the listener gets root without a prompt per press (for beginners)
//!
//! At startup the listener runs `sudo -v` once, so `sudo` caches the user's
//! credentials.  It then starts `sudo -n <self> --helper` with piped stdin and
//! stdout.  That helper runs as root for the whole session and performs
//! toggles on request:
//!
//! ```text
//!  listener (user)                      helper (root)
//!  ┌──────────────┐   stdin pipe       ┌──────────────────┐
//!  │ HelperClient │ ─── requests ────► │ server::serve    │
//!  │  (Toggler)   │ ◄── replies ────── │ ToggleLagUseCase │
//!  └──────────────┘   stdout pipe      └──────────────────┘
//! ```
//!
//! Only the listener holds the other ends of those pipes.  When the listener
//! dies for any reason the pipe closes and the helper lifts the block before
//! exiting.
//!
//! If the helper cannot be started, [`WorkerSpawner`] is used instead: it
//! runs `sudo -n <self> --worker` once per press.

pub mod client;
pub mod framing;
pub mod server;
pub mod worker_spawner;

pub use client::{HelperClient, HelperTimeouts};
pub use server::{serve, ServeSummary};
pub use worker_spawner::WorkerSpawner;

use std::time::Duration;

use lagswitch_core::ProtocolError;
use thiserror::Error;

use crate::application::toggle_lag::ToggleError;

/// Command-line flag that starts the helper.
pub const HELPER_FLAG: &str = "--helper";

/// Command-line flag that runs one toggle.
pub const WORKER_FLAG: &str = "--worker";

/// Error type for starting, connecting to, or running the helper.
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("failed to start helper: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("helper did not open its {0} pipe")]
    MissingPipe(&'static str),

    #[error("helper I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("helper did not become ready within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("helper exited before the handshake")]
    Closed,

    #[error("failed to lift the block on exit: {0}")]
    Cleanup(#[source] ToggleError),
}
