//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page).
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The USB HID standard assigns a number to every key *position* on a
//! keyboard.  Letters start at 0x04 (not at 'A' = 0x41 like ASCII) because the
//! code says which key was pressed, not which character it produces.  The
//! character depends on the layout and on the modifiers held down.
//!
//! | Key          | HID Usage ID |
//! |--------------|--------------|
//! | Letter A     | 0x04         |
//! | Enter        | 0x28         |
//! | Space        | 0x2C         |
//! | Left Ctrl    | 0xE0         |
//!
//! [`HidKeyCode::to_char`] translates a usage to its US-layout character.
//! Usages without an assigned variant decode to `None` from
//! [`HidKeyCode::from_u8`]; 0x00 is the "no key" slot value and never has a
//! variant.

use serde::{Deserialize, Serialize};

/// Declares the key table once and derives the enum, the reverse lookup, and
/// the printable-character table from it.
macro_rules! key_table {
    (@chars $plain:literal, $shifted:literal) => {
        Some(($plain, $shifted))
    };
    (@chars) => {
        None
    };
    ($( $name:ident = $code:literal $(=> $plain:literal, $shifted:literal)? ;)*) => {
        /// USB HID Usage ID for keyboard keys (page 0x07).
        ///
        /// The discriminant of each variant is its Usage ID.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum HidKeyCode {
            $( $name = $code, )*
        }

        impl HidKeyCode {
            /// Looks up the key for a raw Usage ID.
            ///
            /// Returns `None` for 0x00 and for any usage without a variant.
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $code => Some(HidKeyCode::$name), )*
                    _ => None,
                }
            }

            /// Unshifted and shifted US-layout characters, if the key prints.
            fn printable(self) -> Option<(char, char)> {
                match self {
                    $( HidKeyCode::$name => key_table!(@chars $($plain, $shifted)?), )*
                }
            }
        }
    };
}

key_table! {
    // Letters (0x04–0x1D)
    KeyA = 0x04 => 'a', 'A';
    KeyB = 0x05 => 'b', 'B';
    KeyC = 0x06 => 'c', 'C';
    KeyD = 0x07 => 'd', 'D';
    KeyE = 0x08 => 'e', 'E';
    KeyF = 0x09 => 'f', 'F';
    KeyG = 0x0A => 'g', 'G';
    KeyH = 0x0B => 'h', 'H';
    KeyI = 0x0C => 'i', 'I';
    KeyJ = 0x0D => 'j', 'J';
    KeyK = 0x0E => 'k', 'K';
    KeyL = 0x0F => 'l', 'L';
    KeyM = 0x10 => 'm', 'M';
    KeyN = 0x11 => 'n', 'N';
    KeyO = 0x12 => 'o', 'O';
    KeyP = 0x13 => 'p', 'P';
    KeyQ = 0x14 => 'q', 'Q';
    KeyR = 0x15 => 'r', 'R';
    KeyS = 0x16 => 's', 'S';
    KeyT = 0x17 => 't', 'T';
    KeyU = 0x18 => 'u', 'U';
    KeyV = 0x19 => 'v', 'V';
    KeyW = 0x1A => 'w', 'W';
    KeyX = 0x1B => 'x', 'X';
    KeyY = 0x1C => 'y', 'Y';
    KeyZ = 0x1D => 'z', 'Z';

    // Digit row (0x1E–0x27)
    Digit1 = 0x1E => '1', '!';
    Digit2 = 0x1F => '2', '@';
    Digit3 = 0x20 => '3', '#';
    Digit4 = 0x21 => '4', '$';
    Digit5 = 0x22 => '5', '%';
    Digit6 = 0x23 => '6', '^';
    Digit7 = 0x24 => '7', '&';
    Digit8 = 0x25 => '8', '*';
    Digit9 = 0x26 => '9', '(';
    Digit0 = 0x27 => '0', ')';

    // Editing and punctuation (0x28–0x38)
    Enter = 0x28;
    Escape = 0x29;
    Backspace = 0x2A;
    Tab = 0x2B => '\t', '\t';
    Space = 0x2C => ' ', ' ';
    Minus = 0x2D => '-', '_';
    Equal = 0x2E => '=', '+';
    BracketLeft = 0x2F => '[', '{';
    BracketRight = 0x30 => ']', '}';
    Backslash = 0x31 => '\\', '|';
    Semicolon = 0x33 => ';', ':';
    Quote = 0x34 => '\'', '"';
    Backquote = 0x35 => '`', '~';
    Comma = 0x36 => ',', '<';
    Period = 0x37 => '.', '>';
    Slash = 0x38 => '/', '?';
    CapsLock = 0x39;

    // Function keys (0x3A–0x45)
    F1 = 0x3A;
    F2 = 0x3B;
    F3 = 0x3C;
    F4 = 0x3D;
    F5 = 0x3E;
    F6 = 0x3F;
    F7 = 0x40;
    F8 = 0x41;
    F9 = 0x42;
    F10 = 0x43;
    F11 = 0x44;
    F12 = 0x45;

    // Navigation cluster (0x46–0x52)
    PrintScreen = 0x46;
    ScrollLock = 0x47;
    Pause = 0x48;
    Insert = 0x49;
    Home = 0x4A;
    PageUp = 0x4B;
    Delete = 0x4C;
    End = 0x4D;
    PageDown = 0x4E;
    ArrowRight = 0x4F;
    ArrowLeft = 0x50;
    ArrowDown = 0x51;
    ArrowUp = 0x52;

    // Keypad (0x53–0x63); NumLock state is not tracked
    NumLock = 0x53;
    NumpadDivide = 0x54 => '/', '/';
    NumpadMultiply = 0x55 => '*', '*';
    NumpadSubtract = 0x56 => '-', '-';
    NumpadAdd = 0x57 => '+', '+';
    NumpadEnter = 0x58;
    Numpad1 = 0x59 => '1', '1';
    Numpad2 = 0x5A => '2', '2';
    Numpad3 = 0x5B => '3', '3';
    Numpad4 = 0x5C => '4', '4';
    Numpad5 = 0x5D => '5', '5';
    Numpad6 = 0x5E => '6', '6';
    Numpad7 = 0x5F => '7', '7';
    Numpad8 = 0x60 => '8', '8';
    Numpad9 = 0x61 => '9', '9';
    Numpad0 = 0x62 => '0', '0';
    NumpadDecimal = 0x63 => '.', '.';

    ContextMenu = 0x65;

    // Modifiers (0xE0–0xE7); these also appear as bits in the modifier byte
    ControlLeft = 0xE0;
    ShiftLeft = 0xE1;
    AltLeft = 0xE2;
    MetaLeft = 0xE3;
    ControlRight = 0xE4;
    ShiftRight = 0xE5;
    AltRight = 0xE6;
    MetaRight = 0xE7;
}

impl HidKeyCode {
    /// Returns the raw Usage ID of this key.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// US-layout character produced by this key, or `None` if it does not print.
    pub fn to_char(self, shift: bool) -> Option<char> {
        self.printable()
            .map(|(plain, shifted)| if shift { shifted } else { plain })
    }

    /// Returns `true` for Enter and keypad Enter.
    pub fn is_enter(self) -> bool {
        matches!(self, HidKeyCode::Enter | HidKeyCode::NumpadEnter)
    }

    /// Returns `true` if this is a modifier key.
    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            HidKeyCode::ControlLeft
                | HidKeyCode::ControlRight
                | HidKeyCode::ShiftLeft
                | HidKeyCode::ShiftRight
                | HidKeyCode::AltLeft
                | HidKeyCode::AltRight
                | HidKeyCode::MetaLeft
                | HidKeyCode::MetaRight
        )
    }
}
