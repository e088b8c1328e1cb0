//! Mock hotkey source for testing.
//!
//! Allows tests to inject synthetic [`KeyPress`]es without an event tap or
//! Input Monitoring permission.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};

use lagswitch_core::KeyPress;

use super::{CaptureError, HotkeySource};

/// A mock implementation of [`HotkeySource`] that allows tests to inject presses.
#[derive(Clone, Default)]
pub struct MockHotkeySource {
    sender: Arc<Mutex<Option<Sender<KeyPress>>>>,
}

impl MockHotkeySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic press, as if captured from the keyboard.
    ///
    /// Panics if `start()` has not been called or if `stop()` has been called.
    pub fn inject_press(&self, press: KeyPress) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(press)
                .expect("receiver has been dropped; call start() first"),
            None => panic!("MockHotkeySource::inject_press called before start()"),
        }
    }
}

impl HotkeySource for MockHotkeySource {
    fn start(&self) -> Result<mpsc::Receiver<KeyPress>, CaptureError> {
        let (tx, rx) = mpsc::channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}
