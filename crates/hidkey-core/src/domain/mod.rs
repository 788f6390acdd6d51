//! Domain entities for hidkey.
//!
//! This module contains pure values with no infrastructure dependencies.
//!
//! - [`device`] – identity and selection filters for HID endpoints.
//! - [`report`] – raw input reports and the boot-keyboard decoder.
//!
//! Nothing here knows how a device is opened or how reports arrive; those
//! concerns belong to the host adapter in `hidkey-capture`.

pub mod device;
pub mod report;
