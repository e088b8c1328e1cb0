//! Global hotkey capture.
//!
//! On macOS this installs a listen-only CoreGraphics event tap for key-down
//! events on a dedicated CFRunLoop thread.  Events are placed into a std
//! `mpsc` channel; [`forward_to_async`] moves them onto a Tokio channel for
//! the listener loop.
//!
//! # Permissions
//!
//! macOS only delivers key events to a tap when the terminal (or the binary)
//! has been granted Input Monitoring in System Settings.  Without it, tap
//! creation fails with [`CaptureError::TapCreateFailed`].
//!
//! # Testability
//!
//! The [`HotkeySource`] trait allows tests to inject synthetic key presses
//! through [`mock::MockHotkeySource`] without an event tap.

use std::sync::mpsc;
use std::thread;

use lagswitch_core::KeyPress;
use tokio::sync::mpsc as async_mpsc;

pub mod mock;

#[cfg(target_os = "macos")]
pub mod macos;

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to create event tap: {0}")]
    TapCreateFailed(String),
    #[error("platform not supported: {0}")]
    UnsupportedPlatform(String),
}

/// Trait abstracting key event production.
pub trait HotkeySource: Send {
    /// Starts the source and returns a receiver for key-down events.
    fn start(&self) -> Result<mpsc::Receiver<KeyPress>, CaptureError>;
    /// Stops the source and releases all OS resources.  The receiver returned
    /// by [`start`](Self::start) disconnects shortly afterwards.
    fn stop(&self);
}

/// Returns the capture implementation for the running platform.
pub fn platform_source() -> Result<Box<dyn HotkeySource>, CaptureError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::EventTapSource::new()))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Err(CaptureError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

/// Moves presses from a blocking std channel onto a bounded Tokio channel.
///
/// The bridge thread exits when either side disconnects.
pub fn forward_to_async(
    source: mpsc::Receiver<KeyPress>,
    capacity: usize,
) -> std::io::Result<async_mpsc::Receiver<KeyPress>> {
    let (tx, rx) = async_mpsc::channel(capacity);
    thread::Builder::new()
        .name("lagswitch-key-bridge".to_string())
        .spawn(move || {
            while let Ok(press) = source.recv() {
                if tx.blocking_send(press).is_err() {
                    break;
                }
            }
            tracing::debug!("key bridge stopped");
        })?;
    Ok(rx)
}
