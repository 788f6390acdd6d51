//! Key code tables for keyboard reports.
//!
//! The canonical representation is USB HID Usage IDs (page 0x07,
//! Keyboard/Keypad), which is what the key-code slots of a boot-keyboard
//! report carry.  Character translation assumes a US layout.

pub mod hid;

pub use hid::HidKeyCode;

use crate::domain::report::ModifierFlags;

/// Translates a raw key-code slot to the character it types under `modifiers`.
///
/// Returns `None` for empty slots, unassigned usages, and keys that do not
/// print.  Ctrl, Alt and GUI chords never print.
pub fn usage_to_char(code: u8, modifiers: ModifierFlags) -> Option<char> {
    if modifiers.ctrl() || modifiers.alt() || modifiers.gui() {
        return None;
    }
    HidKeyCode::from_u8(code)?.to_char(modifiers.shift())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_to_char_applies_shift() {
        let shift = ModifierFlags(ModifierFlags::RIGHT_SHIFT);
        assert_eq!(usage_to_char(0x04, ModifierFlags::default()), Some('a'));
        assert_eq!(usage_to_char(0x04, shift), Some('A'));
    }

    #[test]
    fn test_usage_to_char_suppresses_chords() {
        let ctrl = ModifierFlags(ModifierFlags::LEFT_CTRL);
        let gui = ModifierFlags(ModifierFlags::LEFT_GUI);
        assert_eq!(usage_to_char(0x06, ctrl), None);
        assert_eq!(usage_to_char(0x06, gui), None);
    }

    #[test]
    fn test_usage_to_char_rejects_empty_slot() {
        assert_eq!(usage_to_char(0x00, ModifierFlags::default()), None);
    }
}
