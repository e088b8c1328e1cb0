//! Command-line mode selection.
//!
//! Only the first argument is inspected; anything after it is ignored.

use std::ffi::OsString;

use crate::infrastructure::helper::{HELPER_FLAG, WORKER_FLAG};

/// Command-line flag that runs the installer.
pub const SETUP_FLAG: &str = "--setup";

/// What the process was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// No argument: listen for the hotkey.
    Listen,
    Setup,
    Worker,
    Helper,
    /// Any other first argument, lossily converted for display.
    Unknown(String),
}

impl Mode {
    /// Name used in privilege error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Listen => "the listener",
            Mode::Setup => "setup",
            Mode::Worker => "the worker",
            Mode::Helper => "the helper",
            Mode::Unknown(_) => "unknown mode",
        }
    }
}

/// Parses the arguments that follow the program name.
pub fn parse_mode<I>(args: I) -> Mode
where
    I: IntoIterator<Item = OsString>,
{
    let Some(first) = args.into_iter().next() else {
        return Mode::Listen;
    };
    match first.to_str() {
        Some(SETUP_FLAG) => Mode::Setup,
        Some(WORKER_FLAG) => Mode::Worker,
        Some(HELPER_FLAG) => Mode::Helper,
        _ => Mode::Unknown(first.to_string_lossy().into_owned()),
    }
}
