//! Mock HID host for unit testing.
//!
//! Lets tests grant devices, script the user's selection, fail or hold an
//! `open`, and inject synthetic input reports without any hardware.

use std::sync::Arc;

use async_trait::async_trait;
use hidkey_core::{Device, DeviceFilter, DeviceHandle, RawReport};
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::{HidHost, HostError, ListenerId, ReportListener};

struct MockDevice {
    device: Device,
    usage_page: u16,
    usage: u16,
    granted: bool,
    open: bool,
    listeners: Vec<(ListenerId, Arc<dyn ReportListener>)>,
}

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    selection: Option<DeviceHandle>,
    next_listener: u64,
    fail_next_open: Option<HostError>,
    fail_next_close: Option<HostError>,
    fail_next_subscribe: Option<HostError>,
    open_gate: Option<Arc<Notify>>,
    open_calls: usize,
    close_calls: usize,
}

impl MockState {
    fn find(&self, handle: DeviceHandle) -> Option<&MockDevice> {
        self.devices.iter().find(|d| d.device.handle == handle)
    }

    fn find_mut(&mut self, handle: DeviceHandle) -> Option<&mut MockDevice> {
        self.devices.iter_mut().find(|d| d.device.handle == handle)
    }
}

/// A scriptable implementation of [`HidHost`].
///
/// Cloning is cheap; clones share the same device table.
#[derive(Clone, Default)]
pub struct MockHidHost {
    state: Arc<Mutex<MockState>>,
}

impl MockHidHost {
    /// Creates a host with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyboard-class device.  It is not granted until [`grant`](Self::grant)
    /// or a successful selection.
    pub fn with_device(self, device: Device) -> Self {
        self.with_device_usage(device, DeviceFilter::KEYBOARD.usage_page, DeviceFilter::KEYBOARD.usage)
    }

    /// Adds a device advertising the given usage page and usage.
    pub fn with_device_usage(self, device: Device, usage_page: u16, usage: u16) -> Self {
        self.state.lock().devices.push(MockDevice {
            device,
            usage_page,
            usage,
            granted: false,
            open: false,
            listeners: Vec::new(),
        });
        self
    }

    /// Marks a device as already granted, so it shows up in `enumerate`.
    pub fn grant(&self, handle: DeviceHandle) {
        if let Some(d) = self.state.lock().find_mut(handle) {
            d.granted = true;
        }
    }

    /// Sets the device the "user" picks on the next `request_selection`.
    /// `None` simulates the user declining.
    pub fn set_selection(&self, handle: Option<DeviceHandle>) {
        self.state.lock().selection = handle;
    }

    /// Makes the next `open` call fail with `error`.
    pub fn fail_next_open(&self, error: HostError) {
        self.state.lock().fail_next_open = Some(error);
    }

    /// Makes the next `close` call fail with `error`.  The device is still closed.
    pub fn fail_next_close(&self, error: HostError) {
        self.state.lock().fail_next_close = Some(error);
    }

    /// Makes the next `add_listener` call fail with `error`.
    pub fn fail_next_subscribe(&self, error: HostError) {
        self.state.lock().fail_next_subscribe = Some(error);
    }

    /// Holds every subsequent `open` until [`release_open`](Self::release_open)
    /// is called once per pending open.
    pub fn pause_opens(&self) {
        self.state.lock().open_gate = Some(Arc::new(Notify::new()));
    }

    /// Lets one held `open` complete.
    pub fn release_open(&self) {
        if let Some(gate) = self.state.lock().open_gate.clone() {
            gate.notify_one();
        }
    }

    /// Simulates the device being unplugged: it closes, loses its listeners,
    /// and its handle becomes unknown.
    pub fn unplug(&self, handle: DeviceHandle) {
        self.state.lock().devices.retain(|d| d.device.handle != handle);
    }

    /// Delivers a report from `handle` to every registered listener, as the
    /// transport would.  Returns the number of listeners invoked.
    ///
    /// Reports from a closed device are dropped.
    pub fn inject_report(&self, handle: DeviceHandle, report_id: u8, data: &[u8]) -> usize {
        // Snapshot the listeners so they run without the host lock held.
        let listeners: Vec<Arc<dyn ReportListener>> = {
            let state = self.state.lock();
            match state.find(handle) {
                Some(d) if d.open => d.listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
                _ => return 0,
            }
        };

        for listener in &listeners {
            listener.on_input_report(RawReport::new(handle, report_id, data));
        }
        listeners.len()
    }

    /// Number of listeners registered on `handle`.
    pub fn listener_count(&self, handle: DeviceHandle) -> usize {
        self.state
            .lock()
            .find(handle)
            .map_or(0, |d| d.listeners.len())
    }

    /// Returns `true` if `handle` is open.
    pub fn device_open(&self, handle: DeviceHandle) -> bool {
        self.state.lock().find(handle).is_some_and(|d| d.open)
    }

    /// Number of `open` calls received so far.
    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }

    /// Number of `close` calls received so far.
    pub fn close_calls(&self) -> usize {
        self.state.lock().close_calls
    }
}

#[async_trait]
impl HidHost for MockHidHost {
    async fn enumerate(&self) -> Result<Vec<Device>, HostError> {
        let state = self.state.lock();
        Ok(state
            .devices
            .iter()
            .filter(|d| d.granted)
            .map(|d| d.device.clone())
            .collect())
    }

    async fn request_selection(&self, filters: &[DeviceFilter]) -> Result<Vec<Device>, HostError> {
        let mut state = self.state.lock();
        let Some(handle) = state.selection else {
            return Ok(Vec::new());
        };
        match state.find_mut(handle) {
            Some(d) if DeviceFilter::any_matches(filters, d.usage_page, d.usage) => {
                d.granted = true;
                Ok(vec![d.device.clone()])
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn open(&self, device: &Device) -> Result<(), HostError> {
        let gate = {
            let mut state = self.state.lock();
            state.open_calls += 1;
            if state.find(device.handle).is_none() {
                return Err(HostError::UnknownDevice(device.handle));
            }
            state.open_gate.clone()
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_open.take() {
            return Err(error);
        }
        match state.find_mut(device.handle) {
            Some(d) => {
                d.open = true;
                Ok(())
            }
            // Unplugged while the open was pending.
            None => Err(HostError::Disconnected(device.handle)),
        }
    }

    async fn close(&self, device: &Device) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.close_calls += 1;
        let failure = state.fail_next_close.take();
        match state.find_mut(device.handle) {
            Some(d) => d.open = false,
            None => return Err(HostError::Disconnected(device.handle)),
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn is_open(&self, device: &Device) -> bool {
        self.device_open(device.handle)
    }

    fn add_listener(
        &self,
        device: &Device,
        listener: Arc<dyn ReportListener>,
    ) -> Result<ListenerId, HostError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_next_subscribe.take() {
            return Err(error);
        }
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        match state.find_mut(device.handle) {
            Some(d) if d.open => {
                d.listeners.push((id, listener));
                Ok(id)
            }
            Some(_) => Err(HostError::NotOpen(device.handle)),
            None => Err(HostError::UnknownDevice(device.handle)),
        }
    }

    fn remove_listener(&self, device: &Device, id: ListenerId) {
        if let Some(d) = self.state.lock().find_mut(device.handle) {
            d.listeners.retain(|(existing, _)| *existing != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingListener(Mutex<Vec<Vec<u8>>>);

    impl ReportListener for CountingListener {
        fn on_input_report(&self, report: RawReport) {
            self.0.lock().push(report.data);
        }
    }

    fn keyboard(handle: u64) -> Device {
        Device {
            handle: DeviceHandle(handle),
            vendor_id: 0x046d,
            product_id: 0xc31c,
            product_name: Some("Test Keyboard".to_string()),
        }
    }

    #[tokio::test]
    async fn test_enumerate_returns_only_granted_devices() {
        // Arrange
        let host = MockHidHost::new().with_device(keyboard(1)).with_device(keyboard(2));
        host.grant(DeviceHandle(2));

        // Act
        let devices = host.enumerate().await.expect("enumerate");

        // Assert
        assert_eq!(devices, vec![keyboard(2)]);
    }

    #[tokio::test]
    async fn test_selection_respects_filters_and_grants() {
        // Arrange – device 1 is a mouse, device 2 a keyboard
        let host = MockHidHost::new()
            .with_device_usage(keyboard(1), 0x01, 0x02)
            .with_device(keyboard(2));

        // Act / Assert
        host.set_selection(Some(DeviceHandle(1)));
        let picked = host.request_selection(&[DeviceFilter::KEYBOARD]).await.unwrap();
        assert!(picked.is_empty(), "mouse must not pass the keyboard filter");

        host.set_selection(Some(DeviceHandle(2)));
        let picked = host.request_selection(&[DeviceFilter::KEYBOARD]).await.unwrap();
        assert_eq!(picked, vec![keyboard(2)]);
        assert_eq!(host.enumerate().await.unwrap(), vec![keyboard(2)]);
    }

    #[tokio::test]
    async fn test_declined_selection_is_empty() {
        let host = MockHidHost::new().with_device(keyboard(1));
        host.set_selection(None);

        let picked = host.request_selection(&[]).await.unwrap();

        assert!(picked.is_empty());
    }

    #[tokio::test]
    async fn test_inject_report_reaches_listener_only_while_open() {
        // Arrange
        let device = keyboard(1);
        let host = MockHidHost::new().with_device(device.clone());
        let listener = Arc::new(CountingListener(Mutex::new(Vec::new())));

        // Act
        host.open(&device).await.expect("open");
        host.add_listener(&device, listener.clone()).expect("subscribe");
        let delivered_open = host.inject_report(device.handle, 0, &[1, 2, 3]);
        host.close(&device).await.expect("close");
        let delivered_closed = host.inject_report(device.handle, 0, &[4]);

        // Assert
        assert_eq!(delivered_open, 1);
        assert_eq!(delivered_closed, 0);
        assert_eq!(*listener.0.lock(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_remove_listener_stops_delivery() {
        let device = keyboard(1);
        let host = MockHidHost::new().with_device(device.clone());
        host.open(&device).await.unwrap();
        let id = host
            .add_listener(&device, Arc::new(CountingListener(Mutex::new(Vec::new()))))
            .unwrap();

        host.remove_listener(&device, id);

        assert_eq!(host.listener_count(device.handle), 0);
        assert_eq!(host.inject_report(device.handle, 0, &[0; 8]), 0);
    }

    #[tokio::test]
    async fn test_add_listener_requires_open_device() {
        let device = keyboard(1);
        let host = MockHidHost::new().with_device(device.clone());

        let result = host.add_listener(&device, Arc::new(CountingListener(Mutex::new(Vec::new()))));

        assert_eq!(result, Err(HostError::NotOpen(device.handle)));
    }

    #[tokio::test]
    async fn test_scripted_open_failure_leaves_device_closed() {
        let device = keyboard(1);
        let host = MockHidHost::new().with_device(device.clone());
        host.fail_next_open(HostError::PermissionDenied(device.handle));

        let result = host.open(&device).await;

        assert_eq!(result, Err(HostError::PermissionDenied(device.handle)));
        assert!(!host.device_open(device.handle));
        // The failure is consumed; a retry succeeds.
        host.open(&device).await.expect("second open");
        assert!(host.device_open(device.handle));
    }

    #[tokio::test]
    async fn test_unplugged_device_is_unknown() {
        let device = keyboard(1);
        let host = MockHidHost::new().with_device(device.clone());
        host.unplug(device.handle);

        assert_eq!(host.open(&device).await, Err(HostError::UnknownDevice(device.handle)));
    }
}
