//! Fan-out of decoded reports to registered consumers.
//!
//! # How it works
//!
//! 1. Consumers register with [`ReportDispatcher::register`] and receive a
//!    [`ConsumerId`] they can later pass to [`ReportDispatcher::remove`].
//! 2. For every report, [`ReportDispatcher::dispatch`] calls each consumer in
//!    registration order, synchronously, on the caller's thread.
//! 3. A consumer that returns an error **or panics** is logged and skipped;
//!    the remaining consumers still receive the same report.
//! 4. Consumers may register or remove consumers from inside
//!    [`ReportConsumer::on_report`].  A consumer registered mid-dispatch first
//!    sees the next report; one removed mid-dispatch is skipped for the rest
//!    of the current report.

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use hidkey_core::DecodedReport;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

/// Error a consumer may return for a single report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsumerError {
    #[error("consumer rejected report: {0}")]
    Rejected(String),
    #[error("consumer panicked: {0}")]
    Panicked(String),
}

/// Receives decoded reports from the dispatcher.
pub trait ReportConsumer: Send {
    /// Handles one report.  Errors are logged by the dispatcher and go no further.
    fn on_report(&mut self, report: &DecodedReport) -> Result<(), ConsumerError>;

    /// Short name used in log messages.
    fn name(&self) -> &str {
        "consumer"
    }
}

/// Adapts a closure into a [`ReportConsumer`].
pub struct FnConsumer<F> {
    name: String,
    f: F,
}

impl<F> FnConsumer<F>
where
    F: FnMut(&DecodedReport) -> Result<(), ConsumerError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ReportConsumer for FnConsumer<F>
where
    F: FnMut(&DecodedReport) -> Result<(), ConsumerError> + Send,
{
    fn on_report(&mut self, report: &DecodedReport) -> Result<(), ConsumerError> {
        (self.f)(report)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handle returned by [`ReportDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

/// Result of dispatching one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Consumers that handled the report without error.
    pub delivered: usize,
    /// Consumers that returned an error or panicked.
    pub failed: usize,
}

struct Entry {
    id: ConsumerId,
    consumer: Box<dyn ReportConsumer>,
}

#[derive(Default)]
struct Registry {
    /// Consumers at rest.  Empty while a dispatch holds them.
    entries: Vec<Entry>,
    /// Ids taken out by the running dispatch.
    in_flight: Vec<ConsumerId>,
    /// In-flight ids removed before the running dispatch put them back.
    removed: Vec<ConsumerId>,
}

/// Delivers decoded reports to consumers in registration order.
#[derive(Default)]
pub struct ReportDispatcher {
    registry: Mutex<Registry>,
    /// Held for a whole dispatch so reports are delivered one at a time.
    turn: Mutex<()>,
    next_id: AtomicU64,
}

impl ReportDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `consumer` to the delivery list.
    pub fn register(&self, consumer: Box<dyn ReportConsumer>) -> ConsumerId {
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.lock().entries.push(Entry { id, consumer });
        id
    }

    /// Registers a closure as a named consumer.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> ConsumerId
    where
        F: FnMut(&DecodedReport) -> Result<(), ConsumerError> + Send + 'static,
    {
        self.register(Box::new(FnConsumer::new(name, f)))
    }

    /// Removes a consumer.  Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ConsumerId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.entries.len();
        registry.entries.retain(|entry| entry.id != id);
        if registry.entries.len() != before {
            return true;
        }

        if registry.in_flight.contains(&id) && !registry.removed.contains(&id) {
            registry.removed.push(id);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        let registry = self.registry.lock();
        registry.entries.len() + registry.in_flight.len() - registry.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers `report` to every consumer.
    ///
    /// Dispatches are serialized, so reports are handled one at a time and in
    /// the order `dispatch` is called.  Consumers may call [`Self::register`]
    /// and [`Self::remove`] but must not call `dispatch` themselves.
    pub fn dispatch(&self, report: &DecodedReport) -> DispatchOutcome {
        let _turn = self.turn.lock();
        let mut outcome = DispatchOutcome::default();

        let mut running = {
            let mut registry = self.registry.lock();
            let taken = mem::take(&mut registry.entries);
            registry.in_flight = taken.iter().map(|entry| entry.id).collect();
            taken
        };

        for entry in running.iter_mut() {
            if self.registry.lock().removed.contains(&entry.id) {
                continue;
            }

            let result = panic::catch_unwind(AssertUnwindSafe(|| entry.consumer.on_report(report)))
                .unwrap_or_else(|payload| Err(ConsumerError::Panicked(panic_message(&*payload))));

            match result {
                Ok(()) => outcome.delivered += 1,
                Err(e) => {
                    warn!(consumer = entry.consumer.name(), "consumer failed: {e}");
                    outcome.failed += 1;
                }
            }
        }

        let mut registry = self.registry.lock();
        let removed = mem::take(&mut registry.removed);
        registry.in_flight.clear();
        running.retain(|entry| !removed.contains(&entry.id));
        running.append(&mut registry.entries);
        registry.entries = running;

        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
