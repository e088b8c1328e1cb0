//! Hotkey names and the key events delivered by the capture layer.
//!
//! The capture layer reports raw platform keycodes; the listener compares them
//! against [`Hotkey::cg_keycode`].  Only keys that make sense as a global
//! trigger while a game has focus are listed (function keys and a few
//! otherwise unused keys).

pub mod macos_cg;

/// Keys that can trigger the lag toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hotkey {
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    F13,
    F14,
    F15,
    Home,
    End,
    PageUp,
    PageDown,
}

impl Hotkey {
    /// Every supported hotkey, in display order.
    pub const ALL: [Hotkey; 19] = [
        Hotkey::F1,
        Hotkey::F2,
        Hotkey::F3,
        Hotkey::F4,
        Hotkey::F5,
        Hotkey::F6,
        Hotkey::F7,
        Hotkey::F8,
        Hotkey::F9,
        Hotkey::F10,
        Hotkey::F11,
        Hotkey::F12,
        Hotkey::F13,
        Hotkey::F14,
        Hotkey::F15,
        Hotkey::Home,
        Hotkey::End,
        Hotkey::PageUp,
        Hotkey::PageDown,
    ];

    /// Lowercase name shown in the listener banner (`"f6"`, `"pageup"`).
    pub fn name(self) -> &'static str {
        match self {
            Hotkey::F1 => "f1",
            Hotkey::F2 => "f2",
            Hotkey::F3 => "f3",
            Hotkey::F4 => "f4",
            Hotkey::F5 => "f5",
            Hotkey::F6 => "f6",
            Hotkey::F7 => "f7",
            Hotkey::F8 => "f8",
            Hotkey::F9 => "f9",
            Hotkey::F10 => "f10",
            Hotkey::F11 => "f11",
            Hotkey::F12 => "f12",
            Hotkey::F13 => "f13",
            Hotkey::F14 => "f14",
            Hotkey::F15 => "f15",
            Hotkey::Home => "home",
            Hotkey::End => "end",
            Hotkey::PageUp => "pageup",
            Hotkey::PageDown => "pagedown",
        }
    }

    /// macOS virtual keycode (`CGKeyCode`) for this key.
    pub fn cg_keycode(self) -> u16 {
        macos_cg::hotkey_to_cgkeycode(self)
    }

    /// Returns `true` if `press` is a fresh press of this key.
    ///
    /// Auto-repeat events generated while the key is held are not matches, so
    /// holding the hotkey toggles exactly once.
    pub fn matches(self, press: &KeyPress) -> bool {
        !press.is_repeat && press.keycode == self.cg_keycode()
    }
}

impl std::fmt::Display for Hotkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key-down event reported by the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    /// Platform virtual keycode (a `CGKeyCode` on macOS).
    pub keycode: u16,
    /// `true` when the OS generated this event because the key is held down.
    pub is_repeat: bool,
}

impl KeyPress {
    pub fn new(keycode: u16) -> Self {
        Self {
            keycode,
            is_repeat: false,
        }
    }

    pub fn repeat(keycode: u16) -> Self {
        Self {
            keycode,
            is_repeat: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_lowercase_name() {
        assert_eq!(Hotkey::F6.to_string(), "f6");
        assert_eq!(Hotkey::PageUp.to_string(), "pageup");
    }

    #[test]
    fn test_matches_fresh_press_only() {
        let code = Hotkey::F6.cg_keycode();
        assert!(Hotkey::F6.matches(&KeyPress::new(code)));
        assert!(!Hotkey::F6.matches(&KeyPress::repeat(code)));
        assert!(!Hotkey::F6.matches(&KeyPress::new(Hotkey::F7.cg_keycode())));
    }
}
