//! Raw input reports and the boot-keyboard decoder.
//!
//! Layout of a boot-protocol keyboard report (8 bytes):
//!
//! ```text
//! Byte 0:    Modifier keys (bitfield)
//!            Bit 0 = Left Ctrl,  Bit 1 = Left Shift,
//!            Bit 2 = Left Alt,   Bit 3 = Left GUI,
//!            Bit 4 = Right Ctrl, Bit 5 = Right Shift,
//!            Bit 6 = Right Alt,  Bit 7 = Right GUI
//! Byte 1:    Reserved
//! Byte 2-7:  Up to 6 simultaneously pressed key codes (0x00 = empty slot)
//! ```
//!
//! [`decode`] never fails.  Buffers shorter than 8 bytes are not interpreted
//! at all and come back as [`DecodedReport::Opaque`] so that consumers can
//! inspect or discard them.  Longer buffers are read with the same layout;
//! a leading report-ID byte is **not** detected.

use serde::{Deserialize, Serialize};

use crate::domain::device::DeviceHandle;
use crate::keymap::hid::HidKeyCode;

/// Length of a boot-protocol keyboard report.
pub const BOOT_REPORT_LEN: usize = 8;

/// Number of key-code slots in a boot-protocol keyboard report.
pub const KEY_SLOT_COUNT: usize = 6;

/// Key-code value marking an empty slot.
pub const NO_KEY: u8 = 0x00;

const MODIFIER_INDEX: usize = 0;
const FIRST_KEY_INDEX: usize = 2;

/// A raw input report exactly as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReport {
    /// Device the report originated from.
    pub device: DeviceHandle,
    /// HID report ID (0 when the device does not use numbered reports).
    pub report_id: u8,
    /// Report payload.
    pub data: Vec<u8>,
}

impl RawReport {
    pub fn new(device: DeviceHandle, report_id: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            device,
            report_id,
            data: data.into(),
        }
    }

    /// Decodes this report's payload.  See [`decode`].
    pub fn decode(&self) -> DecodedReport {
        decode(&self.data)
    }
}

/// Modifier byte of a boot-keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModifierFlags(pub u8);

impl ModifierFlags {
    pub const LEFT_CTRL: u8 = 1 << 0;
    pub const LEFT_SHIFT: u8 = 1 << 1;
    pub const LEFT_ALT: u8 = 1 << 2;
    pub const LEFT_GUI: u8 = 1 << 3;
    pub const RIGHT_CTRL: u8 = 1 << 4;
    pub const RIGHT_SHIFT: u8 = 1 << 5;
    pub const RIGHT_ALT: u8 = 1 << 6;
    pub const RIGHT_GUI: u8 = 1 << 7;

    /// Raw bitmask.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if no modifier is held.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if either Ctrl modifier is active.
    pub fn ctrl(self) -> bool {
        self.0 & (Self::LEFT_CTRL | Self::RIGHT_CTRL) != 0
    }

    /// Returns `true` if either Shift modifier is active.
    pub fn shift(self) -> bool {
        self.0 & (Self::LEFT_SHIFT | Self::RIGHT_SHIFT) != 0
    }

    /// Returns `true` if either Alt modifier is active.
    pub fn alt(self) -> bool {
        self.0 & (Self::LEFT_ALT | Self::RIGHT_ALT) != 0
    }

    /// Returns `true` if either GUI (Win/Cmd/Super) modifier is active.
    pub fn gui(self) -> bool {
        self.0 & (Self::LEFT_GUI | Self::RIGHT_GUI) != 0
    }
}

/// Interpreted content of a report that matched the boot-keyboard layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BootKeyboardReport {
    /// Modifier bitmask (byte 0).
    pub modifiers: ModifierFlags,
    /// Non-empty key slots in their original slot order.  Never contains [`NO_KEY`].
    pub key_codes: Vec<u8>,
}

impl BootKeyboardReport {
    /// Iterates the pressed keys that have a known keyboard-page usage.
    pub fn pressed_keys(&self) -> impl Iterator<Item = HidKeyCode> + '_ {
        self.key_codes.iter().filter_map(|&code| HidKeyCode::from_u8(code))
    }

    /// Returns `true` if `code` is held in this report.
    pub fn is_pressed(&self, code: u8) -> bool {
        code != NO_KEY && self.key_codes.contains(&code)
    }
}

/// Result of decoding one raw report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedReport {
    /// The buffer was at least [`BOOT_REPORT_LEN`] bytes and was read as a boot-keyboard report.
    Boot(BootKeyboardReport),
    /// The buffer was too short to interpret; the bytes are passed through unchanged.
    Opaque(Vec<u8>),
}

impl DecodedReport {
    /// Returns `true` if the input matched the 8-byte boot layout.
    pub fn matched_boot_layout(&self) -> bool {
        matches!(self, DecodedReport::Boot(_))
    }

    /// Modifier bitmask, or `None` for opaque reports.
    pub fn modifiers(&self) -> Option<ModifierFlags> {
        match self {
            DecodedReport::Boot(report) => Some(report.modifiers),
            DecodedReport::Opaque(_) => None,
        }
    }

    /// Active key codes in slot order; empty for opaque reports.
    pub fn key_codes(&self) -> &[u8] {
        match self {
            DecodedReport::Boot(report) => &report.key_codes,
            DecodedReport::Opaque(_) => &[],
        }
    }

    /// The uninterpreted bytes of an opaque report.
    pub fn opaque_payload(&self) -> Option<&[u8]> {
        match self {
            DecodedReport::Boot(_) => None,
            DecodedReport::Opaque(bytes) => Some(bytes),
        }
    }

    /// Returns the boot-keyboard view, if the report matched that layout.
    pub fn as_boot(&self) -> Option<&BootKeyboardReport> {
        match self {
            DecodedReport::Boot(report) => Some(report),
            DecodedReport::Opaque(_) => None,
        }
    }
}

/// Decodes a raw report buffer.
///
/// - `raw.len() >= 8`: byte 0 is the modifier mask, byte 1 is ignored, and the
///   non-zero bytes of slots 2..=7 become the key codes in slot order.
/// - `raw.len() < 8`: the bytes are returned verbatim as [`DecodedReport::Opaque`].
pub fn decode(raw: &[u8]) -> DecodedReport {
    if raw.len() < BOOT_REPORT_LEN {
        return DecodedReport::Opaque(raw.to_vec());
    }

    let key_codes = raw[FIRST_KEY_INDEX..FIRST_KEY_INDEX + KEY_SLOT_COUNT]
        .iter()
        .copied()
        .filter(|&code| code != NO_KEY)
        .collect();

    DecodedReport::Boot(BootKeyboardReport {
        modifiers: ModifierFlags(raw[MODIFIER_INDEX]),
        key_codes,
    })
}
