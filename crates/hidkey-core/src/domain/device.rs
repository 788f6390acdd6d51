//! HID device identity and selection filters.
//!
//! A [`Device`] is a snapshot of what the host reports about one physical HID
//! endpoint.  The core never owns the endpoint itself: the host adapter
//! creates devices on enumeration or user grant and invalidates the handle
//! when the device is unplugged or access is revoked.
//!
//! # Usage pages (for beginners)
//!
//! Every HID collection advertises a *usage page* and a *usage* that describe
//! what kind of device it is.  Keyboards live on the Generic Desktop page
//! (`0x01`) with usage Keyboard (`0x06`).  [`DeviceFilter::KEYBOARD`] is the
//! filter handed to the host when asking the user to pick a keyboard.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier the host assigns to a HID endpoint.
///
/// Two [`Device`] values with the same handle refer to the same endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hid#{}", self.0)
    }
}

/// One physical HID endpoint as described by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Host-assigned handle.
    pub handle: DeviceHandle,
    /// USB vendor ID.
    pub vendor_id: u16,
    /// USB product ID.
    pub product_id: u16,
    /// Product string reported by the firmware, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl Device {
    /// Returns the product name, or `"(unnamed)"` when the firmware reports none.
    pub fn display_name(&self) -> &str {
        match self.product_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "(unnamed)",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (vendor 0x{:04x}, product 0x{:04x})",
            self.display_name(),
            self.vendor_id,
            self.product_id
        )
    }
}

/// Usage page / usage pair used to narrow device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub usage_page: u16,
    pub usage: u16,
}

impl DeviceFilter {
    /// Generic Desktop page (0x01), Keyboard usage (0x06).
    pub const KEYBOARD: DeviceFilter = DeviceFilter {
        usage_page: 0x01,
        usage: 0x06,
    };

    /// Returns `true` if a collection with this usage page and usage passes the filter.
    pub fn matches(&self, usage_page: u16, usage: u16) -> bool {
        self.usage_page == usage_page && self.usage == usage
    }

    /// Returns `true` if any filter in `filters` matches, or if `filters` is empty.
    pub fn any_matches(filters: &[DeviceFilter], usage_page: u16, usage: u16) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(usage_page, usage))
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::KEYBOARD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_device(name: Option<&str>) -> Device {
        Device {
            handle: DeviceHandle(7),
            vendor_id: 0x046d,
            product_id: 0xc31c,
            product_name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_uses_product_name_when_present() {
        let device = make_device(Some("USB Keyboard"));
        assert_eq!(device.display_name(), "USB Keyboard");
    }

    #[test]
    fn test_display_name_falls_back_for_missing_or_empty_name() {
        assert_eq!(make_device(None).display_name(), "(unnamed)");
        assert_eq!(make_device(Some("")).display_name(), "(unnamed)");
    }

    #[test]
    fn test_device_display_includes_ids_in_hex() {
        let text = make_device(Some("Keyboard")).to_string();
        assert_eq!(text, "Keyboard (vendor 0x046d, product 0xc31c)");
    }

    #[test]
    fn test_keyboard_filter_matches_generic_desktop_keyboard_only() {
        assert!(DeviceFilter::KEYBOARD.matches(0x01, 0x06));
        assert!(!DeviceFilter::KEYBOARD.matches(0x01, 0x02)); // mouse
        assert!(!DeviceFilter::KEYBOARD.matches(0x0C, 0x01)); // consumer control
    }

    #[test]
    fn test_any_matches_accepts_everything_when_no_filters_given() {
        assert!(DeviceFilter::any_matches(&[], 0xFF00, 0x01));
        assert!(!DeviceFilter::any_matches(&[DeviceFilter::KEYBOARD], 0xFF00, 0x01));
    }
}
