//! Native [`HidHost`] backed by the `hidapi` crate.
//!
//! There is no permission prompt on a native host, so "granted" means:
//!
//! - the device's vendor/product pair is in the configured allow-list, or
//! - the device was picked by [`HidHost::request_selection`], which grants
//!   the first connected device matching the filters.
//!
//! Opening a device spawns a reader thread that polls it with a short
//! timeout and pushes each input report to the registered listeners.
//! Closing sets the thread's shutdown flag and joins it.  A reader whose
//! device fails drops its own entry, so the device reports as closed and
//! disconnected until the next enumeration.

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use hidkey_core::{Device, DeviceFilter, DeviceHandle, RawReport};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{HidHost, HostError, ListenerId, ReportListener};

/// Poll timeout for the reader thread; bounds how long `close` waits.
const READ_TIMEOUT_MS: i32 = 50;

/// Largest input report read in one call.
const READ_BUFFER_LEN: usize = 64;

type ListenerTable = Arc<Mutex<HashMap<DeviceHandle, Vec<(ListenerId, Arc<dyn ReportListener>)>>>>;
type SharedState = Arc<Mutex<NativeState>>;

struct KnownDevice {
    device: Device,
    path: CString,
    usage_page: u16,
    usage: u16,
    connected: bool,
}

struct Reader {
    shutdown: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct NativeState {
    known: Vec<KnownDevice>,
    granted: Vec<DeviceHandle>,
    readers: HashMap<DeviceHandle, Reader>,
    next_handle: u64,
    next_listener: u64,
}

impl NativeState {
    fn find(&self, handle: DeviceHandle) -> Option<&KnownDevice> {
        self.known.iter().find(|k| k.device.handle == handle)
    }
}

/// HID host over the platform HID stack.
pub struct HidapiHost {
    api: Mutex<HidApi>,
    allowed: Vec<(u16, u16)>,
    state: SharedState,
    listeners: ListenerTable,
}

impl HidapiHost {
    /// Initialises `hidapi`.  `allowed` lists the `(vendor_id, product_id)`
    /// pairs treated as pre-granted.
    pub fn new(allowed: Vec<(u16, u16)>) -> Result<Self, HostError> {
        let api = HidApi::new().map_err(|e| HostError::Backend(e.to_string()))?;
        Ok(Self {
            api: Mutex::new(api),
            allowed,
            state: Arc::new(Mutex::new(NativeState::default())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Re-scans the bus and assigns stable handles by device path.
    fn refresh(&self) -> Result<(), HostError> {
        let mut api = self.api.lock();
        api.refresh_devices()
            .map_err(|e| HostError::Backend(e.to_string()))?;

        let mut state = self.state.lock();
        for known in &mut state.known {
            known.connected = false;
        }

        for info in api.device_list() {
            let path = info.path().to_owned();
            if let Some(known) = state.known.iter_mut().find(|k| k.path == path) {
                known.connected = true;
                continue;
            }

            state.next_handle += 1;
            let handle = DeviceHandle(state.next_handle);
            debug!(
                "found HID device {handle}: VID={:04x} PID={:04x} usage={:04x}:{:04x}",
                info.vendor_id(),
                info.product_id(),
                info.usage_page(),
                info.usage()
            );
            state.known.push(KnownDevice {
                device: Device {
                    handle,
                    vendor_id: info.vendor_id(),
                    product_id: info.product_id(),
                    product_name: info.product_string().map(str::to_string),
                },
                path,
                usage_page: info.usage_page(),
                usage: info.usage(),
                connected: true,
            });
        }
        Ok(())
    }

    fn is_allowed(&self, known: &KnownDevice) -> bool {
        self.allowed
            .contains(&(known.device.vendor_id, known.device.product_id))
    }

    fn stop_reader(reader: Reader) -> JoinHandle<()> {
        reader.shutdown.store(true, Ordering::Relaxed);
        reader.thread
    }
}

impl Drop for HidapiHost {
    fn drop(&mut self) {
        let readers: Vec<Reader> = self.state.lock().readers.drain().map(|(_, r)| r).collect();
        for reader in readers {
            let _ = Self::stop_reader(reader).join();
        }
    }
}

#[async_trait]
impl HidHost for HidapiHost {
    async fn enumerate(&self) -> Result<Vec<Device>, HostError> {
        self.refresh()?;
        let state = self.state.lock();
        Ok(state
            .known
            .iter()
            .filter(|k| k.connected)
            .filter(|k| {
                state.granted.contains(&k.device.handle)
                    || (self.is_allowed(k) && DeviceFilter::KEYBOARD.matches(k.usage_page, k.usage))
            })
            .map(|k| k.device.clone())
            .collect())
    }

    async fn request_selection(&self, filters: &[DeviceFilter]) -> Result<Vec<Device>, HostError> {
        self.refresh()?;
        let mut state = self.state.lock();
        let Some(device) = state
            .known
            .iter()
            .find(|k| k.connected && DeviceFilter::any_matches(filters, k.usage_page, k.usage))
            .map(|k| k.device.clone())
        else {
            return Ok(Vec::new());
        };

        if !state.granted.contains(&device.handle) {
            state.granted.push(device.handle);
        }
        info!(device = %device, "granted HID device");
        Ok(vec![device])
    }

    async fn open(&self, device: &Device) -> Result<(), HostError> {
        let handle = device.handle;
        let path = {
            let state = self.state.lock();
            if state.readers.contains_key(&handle) {
                return Ok(());
            }
            match state.find(handle) {
                Some(k) if k.connected => k.path.clone(),
                Some(_) => return Err(HostError::Disconnected(handle)),
                None => return Err(HostError::UnknownDevice(handle)),
            }
        };

        let hid = self
            .api
            .lock()
            .open_path(&path)
            .map_err(|e| HostError::Backend(e.to_string()))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread = {
            let shutdown = Arc::clone(&shutdown);
            let state = Arc::clone(&self.state);
            let listeners = Arc::clone(&self.listeners);
            std::thread::Builder::new()
                .name(format!("hid-reader-{}", handle.0))
                .spawn(move || {
                    if run_reader_loop(hid, handle, &listeners, &shutdown).is_err() {
                        release_failed_reader(&state, &listeners, handle, &shutdown);
                    }
                })
                .map_err(|e| HostError::Backend(e.to_string()))?
        };

        self.state
            .lock()
            .readers
            .insert(handle, Reader { shutdown, thread });
        info!(device = %device, "opened HID device");
        Ok(())
    }

    async fn close(&self, device: &Device) -> Result<(), HostError> {
        let Some(reader) = self.state.lock().readers.remove(&device.handle) else {
            return Ok(());
        };

        let thread = Self::stop_reader(reader);
        tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| HostError::Backend(e.to_string()))?
            .map_err(|_| HostError::Backend("reader thread panicked".to_string()))?;

        info!(device = %device, "closed HID device");
        Ok(())
    }

    fn is_open(&self, device: &Device) -> bool {
        self.state.lock().readers.contains_key(&device.handle)
    }

    fn add_listener(
        &self,
        device: &Device,
        listener: Arc<dyn ReportListener>,
    ) -> Result<ListenerId, HostError> {
        let id = {
            let mut state = self.state.lock();
            if !state.readers.contains_key(&device.handle) {
                return Err(HostError::NotOpen(device.handle));
            }
            state.next_listener += 1;
            ListenerId(state.next_listener)
        };

        self.listeners
            .lock()
            .entry(device.handle)
            .or_default()
            .push((id, listener));
        Ok(id)
    }

    fn remove_listener(&self, device: &Device, id: ListenerId) {
        if let Some(list) = self.listeners.lock().get_mut(&device.handle) {
            list.retain(|(existing, _)| *existing != id);
        }
    }
}

/// Reads input reports until `shutdown` is set or the device errors.
fn run_reader_loop(
    hid: HidDevice,
    handle: DeviceHandle,
    listeners: &ListenerTable,
    shutdown: &AtomicBool,
) -> Result<(), hidapi::HidError> {
    debug!("reader for {handle} started");
    let mut buf = [0u8; READ_BUFFER_LEN];

    while !shutdown.load(Ordering::Relaxed) {
        let len = match hid.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => continue,
            Ok(len) => len,
            Err(e) => {
                warn!("read from {handle} failed, stopping reader: {e}");
                return Err(e);
            }
        };

        let targets: Vec<Arc<dyn ReportListener>> = listeners
            .lock()
            .get(&handle)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in targets {
            listener.on_input_report(RawReport::new(handle, 0, &buf[..len]));
        }
    }

    debug!("reader for {handle} stopped");
    Ok(())
}

/// Forgets a reader that stopped on a device error.
///
/// Only the reader owning `shutdown` is dropped, so a concurrent `close`
/// followed by a fresh `open` keeps the new reader.  Runs on the failing
/// reader thread, which exits right after, so its handle is dropped unjoined.
fn release_failed_reader(
    state: &Mutex<NativeState>,
    listeners: &ListenerTable,
    handle: DeviceHandle,
    shutdown: &Arc<AtomicBool>,
) {
    let mut state = state.lock();
    let owned = state
        .readers
        .get(&handle)
        .is_some_and(|reader| Arc::ptr_eq(&reader.shutdown, shutdown));
    if !owned {
        return;
    }

    state.readers.remove(&handle);
    if let Some(known) = state.known.iter_mut().find(|k| k.device.handle == handle) {
        known.connected = false;
    }
    listeners.lock().remove(&handle);
    info!("released {handle} after read failure");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(handle: DeviceHandle) -> KnownDevice {
        KnownDevice {
            device: Device {
                handle,
                vendor_id: 0x046d,
                product_id: 0xc31c,
                product_name: None,
            },
            path: CString::new("/dev/hidraw0").unwrap(),
            usage_page: 0x01,
            usage: 0x06,
            connected: true,
        }
    }

    fn idle_reader() -> Reader {
        Reader {
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: std::thread::spawn(|| {}),
        }
    }

    struct Ignore;

    impl ReportListener for Ignore {
        fn on_input_report(&self, _report: RawReport) {}
    }

    #[test]
    fn test_failed_reader_marks_device_closed_and_disconnected() {
        // Arrange
        let handle = DeviceHandle(1);
        let reader = idle_reader();
        let shutdown = Arc::clone(&reader.shutdown);
        let state = Mutex::new(NativeState::default());
        state.lock().known.push(known(handle));
        state.lock().readers.insert(handle, reader);
        let listeners: ListenerTable = Arc::new(Mutex::new(HashMap::new()));
        listeners
            .lock()
            .insert(handle, vec![(ListenerId(1), Arc::new(Ignore) as Arc<dyn ReportListener>)]);

        // Act
        release_failed_reader(&state, &listeners, handle, &shutdown);

        // Assert
        let state = state.lock();
        assert!(!state.readers.contains_key(&handle), "device no longer reports open");
        assert_eq!(state.find(handle).map(|k| k.connected), Some(false));
        assert!(listeners.lock().get(&handle).is_none());
    }

    #[test]
    fn test_failed_reader_leaves_replacement_reader_alone() {
        // Arrange
        let handle = DeviceHandle(1);
        let stale = Arc::new(AtomicBool::new(true));
        let state = Mutex::new(NativeState::default());
        state.lock().known.push(known(handle));
        state.lock().readers.insert(handle, idle_reader());
        let listeners: ListenerTable = Arc::new(Mutex::new(HashMap::new()));

        // Act
        release_failed_reader(&state, &listeners, handle, &stale);

        // Assert
        let state = state.lock();
        assert!(state.readers.contains_key(&handle));
        assert_eq!(state.find(handle).map(|k| k.connected), Some(true));
    }
}
