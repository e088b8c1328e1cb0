//! macOS key capture through a CoreGraphics event tap.
//!
//! The tap is created listen-only at the session level, so it observes key
//! presses in every application (the game included) without being able to
//! swallow or modify them.  It lives on a dedicated thread that spins a
//! CFRunLoop in short slices, checking a stop flag between slices.
//!
//! # Safety
//!
//! This module uses `unsafe` only to read CoreFoundation run-loop mode
//! constants.  All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "macos")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
    EventField,
};
use lagswitch_core::keymap::macos_cg::cgkeycode_to_hotkey;
use lagswitch_core::KeyPress;

use super::{CaptureError, HotkeySource};

/// Length of one run-loop slice between stop-flag checks.
const RUN_LOOP_SLICE: Duration = Duration::from_millis(200);

/// Session-level, listen-only key-down tap.
pub struct EventTapSource {
    stopped: Arc<AtomicBool>,
}

impl EventTapSource {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Default for EventTapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeySource for EventTapSource {
    fn start(&self) -> Result<mpsc::Receiver<KeyPress>, CaptureError> {
        let (tx, rx) = mpsc::channel::<KeyPress>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let stopped = Arc::clone(&self.stopped);
        stopped.store(false, Ordering::SeqCst);

        thread::Builder::new()
            .name("lagswitch-event-tap".to_string())
            .spawn(move || run_tap_loop(tx, ready_tx, stopped))
            .map_err(|e| CaptureError::TapCreateFailed(e.to_string()))?;

        // The tap can only be created on the thread that runs its loop, so
        // wait for that thread to report whether it succeeded.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::TapCreateFailed(
                "event tap thread exited before reporting".to_string(),
            )),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn run_tap_loop(
    tx: Sender<KeyPress>,
    ready: Sender<Result<(), CaptureError>>,
    stopped: Arc<AtomicBool>,
) {
    let callback_stopped = Arc::clone(&stopped);
    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        move |_proxy, event_type, event: &CGEvent| {
            if matches!(event_type, CGEventType::KeyDown) {
                let press = key_press_from(event);
                if tx.send(press).is_err() {
                    callback_stopped.store(true, Ordering::SeqCst);
                }
            }
            None
        },
    );

    let tap = match tap {
        Ok(tap) => tap,
        Err(()) => {
            let _ = ready.send(Err(CaptureError::TapCreateFailed(
                "CGEventTapCreate returned null; grant Input Monitoring to this terminal"
                    .to_string(),
            )));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready.send(Err(CaptureError::TapCreateFailed(
                "could not create run loop source for event tap".to_string(),
            )));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    // SAFETY: kCFRunLoopCommonModes is an immutable CFString owned by CoreFoundation.
    unsafe { run_loop.add_source(&source, kCFRunLoopCommonModes) };
    tap.enable();
    let _ = ready.send(Ok(()));
    tracing::debug!("event tap installed");

    while !stopped.load(Ordering::SeqCst) {
        // SAFETY: kCFRunLoopDefaultMode is an immutable CFString owned by CoreFoundation.
        let mode = unsafe { kCFRunLoopDefaultMode };
        CFRunLoop::run_in_mode(mode, RUN_LOOP_SLICE, false);
    }

    // Dropping the tap drops the callback and with it the last sender.
    drop(tap);
    tracing::debug!("event tap removed");
}

fn key_press_from(event: &CGEvent) -> KeyPress {
    let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
    let is_repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT) != 0;
    if let Some(key) = cgkeycode_to_hotkey(keycode) {
        tracing::trace!(%key, is_repeat, "hotkey candidate");
    }
    KeyPress { keycode, is_repeat }
}
