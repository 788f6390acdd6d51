//! Host HID access adapters.
//!
//! The session manager never talks to a HID library directly.  It depends on
//! the [`HidHost`] trait, which mirrors what a host environment offers:
//! enumerate granted devices, ask the user to pick one, open and close it,
//! and push input reports to registered listeners.
//!
//! # Report delivery
//!
//! Delivery is push-based.  The host calls
//! [`ReportListener::on_input_report`] on whatever thread receives the
//! report, once per report, in arrival order.  Listeners must return
//! promptly; the host does not queue reports on their behalf.
//!
//! # Testability
//!
//! [`mock::MockHidHost`] lets tests script device grants, user selection,
//! open failures, and in-flight opens, and inject reports without hardware.
//! The `hidapi` feature adds [`native::HidapiHost`], backed by the `hidapi`
//! crate.

use std::sync::Arc;

use async_trait::async_trait;
use hidkey_core::{Device, DeviceFilter, DeviceHandle, RawReport};
use thiserror::Error;

pub mod mock;

#[cfg(feature = "hidapi")]
pub mod native;

/// Identifies one listener registration on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Error type for host HID operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("device {0} is not known to the host")]
    UnknownDevice(DeviceHandle),
    #[error("permission denied for device {0}")]
    PermissionDenied(DeviceHandle),
    #[error("device {0} was disconnected")]
    Disconnected(DeviceHandle),
    #[error("device {0} is not open")]
    NotOpen(DeviceHandle),
    #[error("HID backend error: {0}")]
    Backend(String),
}

/// Receives raw input reports pushed by the host.
pub trait ReportListener: Send + Sync {
    fn on_input_report(&self, report: RawReport);
}

/// Abstraction over the host environment's HID access interface.
///
/// Every `async` method is a point where the caller yields until the host
/// completes the operation.
#[async_trait]
pub trait HidHost: Send + Sync {
    /// Returns the devices the user has already granted access to.
    async fn enumerate(&self) -> Result<Vec<Device>, HostError>;

    /// Asks the user to pick a device matching `filters`.
    ///
    /// An empty vector means the user declined or nothing matched.
    async fn request_selection(&self, filters: &[DeviceFilter]) -> Result<Vec<Device>, HostError>;

    /// Opens `device` for input.
    async fn open(&self, device: &Device) -> Result<(), HostError>;

    /// Closes `device`.
    async fn close(&self, device: &Device) -> Result<(), HostError>;

    /// Returns `true` if `device` is currently open.
    fn is_open(&self, device: &Device) -> bool;

    /// Registers `listener` for input reports from `device`.
    fn add_listener(
        &self,
        device: &Device,
        listener: Arc<dyn ReportListener>,
    ) -> Result<ListenerId, HostError>;

    /// Removes a listener registration.  Unknown ids are ignored.
    fn remove_listener(&self, device: &Device, id: ListenerId);
}

/// Hint logged when this build has no HID backend.
pub const NO_BACKEND_HINT: &str =
    "built without a HID backend; rebuild with `--features hidapi` to capture from a keyboard";

/// Detects HID access on this host.
///
/// Returns `None` when this build has no HID backend or the backend fails to
/// initialise; callers treat that as "access unsupported".
pub fn detect_host(allowed_devices: &[(u16, u16)]) -> Option<Arc<dyn HidHost>> {
    #[cfg(feature = "hidapi")]
    {
        match native::HidapiHost::new(allowed_devices.to_vec()) {
            Ok(host) => Some(Arc::new(host) as Arc<dyn HidHost>),
            Err(e) => {
                tracing::error!("failed to initialise HID backend: {e}");
                None
            }
        }
    }

    #[cfg(not(feature = "hidapi"))]
    {
        let _ = allowed_devices;
        tracing::debug!("{NO_BACKEND_HINT}");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_backend_hint_names_the_feature() {
        assert!(NO_BACKEND_HINT.contains("--features hidapi"));
    }

    #[cfg(not(feature = "hidapi"))]
    #[test]
    fn test_build_without_backend_reports_no_access() {
        // Arrange
        let allowed = [(0x046d, 0xc31c)];

        // Act
        let host = detect_host(&allowed);

        // Assert
        assert!(host.is_none());
    }
}
