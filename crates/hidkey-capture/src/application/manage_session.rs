//! SessionManager: owns the single active capture session.
//!
//! # State machine
//!
//! ```text
//!            attach()                 open + subscribe ok
//!   Idle ─────────────▶ Opening ──────────────────────────▶ Attached
//!    ▲                     │ open/subscribe failed,             │
//!    │                     │ or detach() while opening          │ detach()
//!    │◀────────────────────┘                                    ▼
//!    └──────────────────────────────────────────────────── Detaching
//! ```
//!
//! Reports are only forwarded while `Attached`.  A session is either fully
//! attached (device open and listener registered) or absent; every failure
//! path unwinds back to `Idle` with no listener left behind.
//!
//! # Cancellation
//!
//! `detach()` may be called while an `attach()` is waiting on the host's
//! `open`.  Each attach takes a generation number; detach bumps it.  When
//! the open completes, the attach notices the stale generation, closes the
//! device again, and returns [`CaptureError::AttachCancelled`].
//!
//! The internal lock is never held across an `.await`.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hidkey_core::{DecodedReport, Device, DeviceFilter, DeviceHandle, RawReport};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::dispatch_reports::ReportDispatcher;
use crate::infrastructure::hid_host::{HidHost, HostError, ListenerId, ReportListener};

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Attached,
    Detaching,
}

/// A live binding between the manager and one open, subscribed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Unique per attach; a re-attach of the same device gets a new id.
    pub id: Uuid,
    pub device: Device,
    listener: ListenerId,
}

impl Session {
    /// Listener registration held on the host for this session.
    pub fn listener(&self) -> ListenerId {
        self.listener
    }
}

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("HID access is not supported on this host")]
    AccessUnsupported,
    #[error("failed to open {device}: {source}")]
    OpenFailed {
        device: DeviceHandle,
        source: HostError,
    },
    #[error("failed to subscribe to reports from {device}: {source}")]
    SubscribeFailed {
        device: DeviceHandle,
        source: HostError,
    },
    #[error("attach of {0} was cancelled by detach")]
    AttachCancelled(DeviceHandle),
    #[error("session manager is busy ({0:?})")]
    Busy(SessionState),
    #[error("failed to close {device}: {source}")]
    CloseFailed {
        device: DeviceHandle,
        source: HostError,
    },
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Observability hook called for every accepted report, before dispatch.
pub type TraceHook = Arc<dyn Fn(&RawReport, &DecodedReport) + Send + Sync>;

// ── Report pipeline ───────────────────────────────────────────────────────────

/// The listener registered on the host: decode, trace, dispatch.
struct ReportPipeline {
    device: DeviceHandle,
    accepting: AtomicBool,
    dispatcher: Arc<ReportDispatcher>,
    last_report: Arc<Mutex<Option<RawReport>>>,
    trace: Arc<Mutex<Option<TraceHook>>>,
}

impl ReportPipeline {
    fn start(&self) {
        self.accepting.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
    }
}

impl ReportListener for ReportPipeline {
    fn on_input_report(&self, report: RawReport) {
        if !self.accepting.load(Ordering::Acquire) {
            trace!(device = %report.device, "session not attached; dropping report");
            return;
        }
        if report.device != self.device {
            trace!(device = %report.device, expected = %self.device, "report from another device; dropping");
            return;
        }

        let decoded = report.decode();
        if !decoded.matched_boot_layout() {
            debug!(
                device = %report.device,
                len = report.data.len(),
                "report shorter than boot layout; passing through"
            );
        }

        let hook = self.trace.lock().clone();
        if let Some(hook) = hook {
            if panic::catch_unwind(AssertUnwindSafe(|| hook(&report, &decoded))).is_err() {
                warn!(device = %report.device, "trace hook panicked; report still dispatched");
            }
        }

        let outcome = self.dispatcher.dispatch(&decoded);
        trace!(
            report_id = report.report_id,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "report dispatched"
        );

        *self.last_report.lock() = Some(report);
    }
}

// ── Session manager ───────────────────────────────────────────────────────────

struct ActiveSession {
    session: Session,
    pipeline: Arc<ReportPipeline>,
}

struct Inner {
    state: SessionState,
    active: Option<ActiveSession>,
    /// Device an in-flight attach is opening.
    pending: Option<Device>,
    /// Bumped by every attach and by a detach that cancels one.
    generation: u64,
    known_devices: Vec<Device>,
}

impl Inner {
    fn remember(&mut self, device: &Device) {
        if !self.known_devices.iter().any(|d| d.handle == device.handle) {
            self.known_devices.push(device.clone());
        }
    }

    /// Returns `true` if a newer attach or the active session uses `handle`.
    fn wants(&self, handle: DeviceHandle) -> bool {
        self.pending.as_ref().is_some_and(|d| d.handle == handle)
            || self
                .active
                .as_ref()
                .is_some_and(|a| a.session.device.handle == handle)
    }
}

/// Manages the single capture session against a [`HidHost`].
pub struct SessionManager {
    host: Option<Arc<dyn HidHost>>,
    dispatcher: Arc<ReportDispatcher>,
    inner: Mutex<Inner>,
    last_report: Arc<Mutex<Option<RawReport>>>,
    trace: Arc<Mutex<Option<TraceHook>>>,
}

impl SessionManager {
    /// Creates a manager backed by `host`.
    pub fn new(host: Arc<dyn HidHost>) -> Self {
        Self::with_access(Some(host))
    }

    /// Creates a manager for a host without HID access.  Every operation
    /// that needs the host fails with [`CaptureError::AccessUnsupported`].
    pub fn unsupported() -> Self {
        Self::with_access(None)
    }

    /// Creates a manager from the result of [`detect_host`](crate::infrastructure::hid_host::detect_host).
    pub fn with_access(host: Option<Arc<dyn HidHost>>) -> Self {
        Self {
            host,
            dispatcher: Arc::new(ReportDispatcher::new()),
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                active: None,
                pending: None,
                generation: 0,
                known_devices: Vec::new(),
            }),
            last_report: Arc::new(Mutex::new(None)),
            trace: Arc::new(Mutex::new(None)),
        }
    }

    /// Dispatcher that receives every decoded report; register consumers here.
    pub fn dispatcher(&self) -> &Arc<ReportDispatcher> {
        &self.dispatcher
    }

    /// Installs a hook called with each accepted report and its decoding.
    pub fn set_trace_hook(&self, hook: impl Fn(&RawReport, &DecodedReport) + Send + Sync + 'static) {
        *self.trace.lock() = Some(Arc::new(hook));
    }

    pub fn clear_trace_hook(&self) {
        *self.trace.lock() = None;
    }

    /// Returns `true` if the host offers HID access at all.
    pub fn is_supported(&self) -> bool {
        self.host.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn active_session(&self) -> Option<Session> {
        self.inner.lock().active.as_ref().map(|a| a.session.clone())
    }

    /// Devices seen through enumeration or selection, in discovery order.
    pub fn known_devices(&self) -> Vec<Device> {
        self.inner.lock().known_devices.clone()
    }

    /// Most recent report accepted by any session.
    pub fn last_report(&self) -> Option<RawReport> {
        self.last_report.lock().clone()
    }

    fn host(&self) -> Result<Arc<dyn HidHost>, CaptureError> {
        self.host.clone().ok_or(CaptureError::AccessUnsupported)
    }

    /// Lists devices the user has already granted.
    pub async fn list_granted_devices(&self) -> Result<Vec<Device>, CaptureError> {
        let host = self.host()?;
        let devices = host.enumerate().await?;

        let mut inner = self.inner.lock();
        for device in &devices {
            inner.remember(device);
        }
        debug!(count = devices.len(), "enumerated granted devices");
        Ok(devices)
    }

    /// Asks the user to select a device matching `filters`.
    ///
    /// Returns `Ok(None)` if the user declined or nothing matched.
    pub async fn request_device(&self, filters: &[DeviceFilter]) -> Result<Option<Device>, CaptureError> {
        let host = self.host()?;
        let selected = host.request_selection(filters).await?.into_iter().next();

        match &selected {
            Some(device) => {
                info!(device = %device, "device selected");
                self.inner.lock().remember(device);
            }
            None => info!("device selection declined"),
        }
        Ok(selected)
    }

    /// Opens `device` (if needed) and subscribes the report pipeline.
    ///
    /// Attaching the device that is already attached returns the existing
    /// session.  Attaching a different device detaches the current one first.
    pub async fn attach(&self, device: &Device) -> Result<Session, CaptureError> {
        let host = self.host()?;

        let generation = loop {
            {
                let mut inner = self.inner.lock();
                match inner.state {
                    SessionState::Idle => {
                        inner.state = SessionState::Opening;
                        inner.pending = Some(device.clone());
                        inner.generation += 1;
                        break inner.generation;
                    }
                    SessionState::Attached => {
                        if let Some(active) = inner
                            .active
                            .as_ref()
                            .filter(|a| a.session.device.handle == device.handle)
                        {
                            debug!(session = %active.session.id, "device already attached");
                            return Ok(active.session.clone());
                        }
                    }
                    state @ (SessionState::Opening | SessionState::Detaching) => {
                        return Err(CaptureError::Busy(state));
                    }
                }
            }

            info!(device = %device, "switching device; detaching current session");
            if let Err(e) = self.detach().await {
                warn!("previous session did not close cleanly: {e}");
            }
        };

        if host.is_open(device) {
            debug!(device = %device.handle, "device already open; skipping open");
        } else if let Err(source) = host.open(device).await {
            let mut inner = self.inner.lock();
            if inner.generation == generation {
                inner.state = SessionState::Idle;
                inner.pending = None;
            }
            warn!(device = %device, "open failed: {source}");
            return Err(CaptureError::OpenFailed {
                device: device.handle,
                source,
            });
        }

        let pipeline = Arc::new(ReportPipeline {
            device: device.handle,
            accepting: AtomicBool::new(false),
            dispatcher: Arc::clone(&self.dispatcher),
            last_report: Arc::clone(&self.last_report),
            trace: Arc::clone(&self.trace),
        });

        let outcome = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                let close = !inner.wants(device.handle);
                Err((CaptureError::AttachCancelled(device.handle), close))
            } else {
                pipeline.start();
                match host.add_listener(device, Arc::clone(&pipeline) as Arc<dyn ReportListener>) {
                    Ok(listener) => {
                        let session = Session {
                            id: Uuid::new_v4(),
                            device: device.clone(),
                            listener,
                        };
                        inner.state = SessionState::Attached;
                        inner.pending = None;
                        inner.remember(device);
                        inner.active = Some(ActiveSession {
                            session: session.clone(),
                            pipeline,
                        });
                        Ok(session)
                    }
                    Err(source) => {
                        pipeline.stop();
                        inner.state = SessionState::Idle;
                        inner.pending = None;
                        let error = CaptureError::SubscribeFailed {
                            device: device.handle,
                            source,
                        };
                        Err((error, true))
                    }
                }
            }
        };

        match outcome {
            Ok(session) => {
                info!(session = %session.id, device = %device, "session attached");
                Ok(session)
            }
            Err((error, close)) => {
                warn!(device = %device, "attach unwound: {error}");
                if close && host.is_open(device) {
                    if let Err(e) = host.close(device).await {
                        warn!(device = %device, "close after failed attach failed: {e}");
                    }
                }
                Err(error)
            }
        }
    }

    /// Ends the current session, or cancels an in-flight attach.
    ///
    /// The listener is removed before the device is closed, and the manager
    /// is back in `Idle` when this returns, even if closing failed.  A no-op
    /// when nothing is attached.
    pub async fn detach(&self) -> Result<(), CaptureError> {
        let Some(host) = self.host.clone() else {
            return Ok(());
        };

        let active = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Idle | SessionState::Detaching => return Ok(()),
                SessionState::Opening => {
                    inner.generation += 1;
                    inner.state = SessionState::Idle;
                    if let Some(device) = inner.pending.take() {
                        info!(device = %device, "cancelling in-flight attach");
                    }
                    return Ok(());
                }
                SessionState::Attached => {
                    let Some(active) = inner.active.take() else {
                        inner.state = SessionState::Idle;
                        return Ok(());
                    };
                    inner.state = SessionState::Detaching;
                    active.pipeline.stop();
                    host.remove_listener(&active.session.device, active.session.listener);
                    active
                }
            }
        };

        let device = &active.session.device;
        let result = if host.is_open(device) {
            host.close(device)
                .await
                .map_err(|source| CaptureError::CloseFailed {
                    device: device.handle,
                    source,
                })
        } else {
            Ok(())
        };

        self.inner.lock().state = SessionState::Idle;

        match &result {
            Ok(()) => info!(session = %active.session.id, device = %device, "session detached"),
            Err(e) => warn!(session = %active.session.id, "session detached with error: {e}"),
        }
        result
    }

    /// Attaches the first already-granted device, if there is one.
    pub async fn attach_first_granted(&self) -> Result<Option<Session>, CaptureError> {
        let devices = self.list_granted_devices().await?;
        match devices.first() {
            Some(device) => self.attach(device).await.map(Some),
            None => {
                info!("no previously granted devices");
                Ok(None)
            }
        }
    }

    /// Prompts for a device and attaches it.  `Ok(None)` if the user declined.
    pub async fn request_and_attach(&self, filters: &[DeviceFilter]) -> Result<Option<Session>, CaptureError> {
        match self.request_device(filters).await? {
            Some(device) => self.attach(&device).await.map(Some),
            None => Ok(None),
        }
    }
}
