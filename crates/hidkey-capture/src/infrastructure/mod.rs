//! Infrastructure layer for the capture library.
//!
//! Contains the adapters that touch the outside world: the host HID access
//! interface and file-system configuration.
//!
//! **Dependency rule**: this layer may depend on `hidkey_core`, but MUST NOT
//! import from the `application` layer.

pub mod hid_host;
pub mod storage;
