//! Hotkey to macOS CGKeyCode translation table.
//!
//! CGKeyCode values are defined in Carbon Events.h (HIToolbox framework).
//! Reference: /System/Library/Frameworks/Carbon.framework/Versions/A/Frameworks/HIToolbox.framework/Headers/Events.h

use super::Hotkey;

/// Translates a [`Hotkey`] to a macOS `CGKeyCode` value.
///
/// Every supported hotkey has a code, so this never fails.
pub fn hotkey_to_cgkeycode(key: Hotkey) -> u16 {
    match key {
        Hotkey::F1 => 0x7A,       // kVK_F1
        Hotkey::F2 => 0x78,       // kVK_F2
        Hotkey::F3 => 0x63,       // kVK_F3
        Hotkey::F4 => 0x76,       // kVK_F4
        Hotkey::F5 => 0x60,       // kVK_F5
        Hotkey::F6 => 0x61,       // kVK_F6
        Hotkey::F7 => 0x62,       // kVK_F7
        Hotkey::F8 => 0x64,       // kVK_F8
        Hotkey::F9 => 0x65,       // kVK_F9
        Hotkey::F10 => 0x6D,      // kVK_F10
        Hotkey::F11 => 0x67,      // kVK_F11
        Hotkey::F12 => 0x6F,      // kVK_F12
        Hotkey::F13 => 0x69,      // kVK_F13
        Hotkey::F14 => 0x6B,      // kVK_F14
        Hotkey::F15 => 0x71,      // kVK_F15
        Hotkey::Home => 0x73,     // kVK_Home
        Hotkey::End => 0x77,      // kVK_End
        Hotkey::PageUp => 0x74,   // kVK_PageUp
        Hotkey::PageDown => 0x79, // kVK_PageDown
    }
}

/// Reverse lookup used when logging captured keycodes.
pub fn cgkeycode_to_hotkey(code: u16) -> Option<Hotkey> {
    Hotkey::ALL
        .into_iter()
        .find(|key| hotkey_to_cgkeycode(*key) == code)
}
