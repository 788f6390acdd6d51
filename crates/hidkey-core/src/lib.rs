//! # hidkey-core
//!
//! Shared library for hidkey containing the domain entities, the
//! boot-keyboard report decoder, and the keyboard usage-ID tables.
//!
//! It has zero dependencies on OS APIs, async runtimes, or HID libraries;
//! everything in here is a plain value or a pure function, so it can be unit
//! tested on any platform.
//!
//! # Architecture overview (for beginners)
//!
//! hidkey reads keystrokes from a keyboard that is reached through a generic
//! HID transport instead of the operating system's normal keyboard input.
//! The keyboard sends small byte buffers called *reports*; each report says
//! which modifier keys and which ordinary keys are currently held down.
//!
//! This crate defines:
//!
//! - **`domain`** – The nouns of the system: a [`Device`] as reported by the
//!   host, the [`RawReport`] buffers it delivers, and the [`DecodedReport`]
//!   produced by [`decode`].
//!
//! - **`keymap`** – The USB HID Usage IDs for the keyboard page and their
//!   US-layout character translation, used by text consumers.
//!
//! The session lifecycle (open, subscribe, close) lives in the
//! `hidkey-capture` crate.

pub mod domain;
pub mod keymap;

pub use domain::device::{Device, DeviceFilter, DeviceHandle};
pub use domain::report::{
    decode, BootKeyboardReport, DecodedReport, ModifierFlags, RawReport, BOOT_REPORT_LEN,
    KEY_SLOT_COUNT, NO_KEY,
};
pub use keymap::hid::HidKeyCode;
