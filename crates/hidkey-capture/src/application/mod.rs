//! Application layer: the capture use cases.
//!
//! Everything here depends on the [`HidHost`](crate::infrastructure::hid_host::HidHost)
//! trait and on domain types from `hidkey_core`, never on a concrete HID
//! library, so the whole layer runs against
//! [`MockHidHost`](crate::infrastructure::hid_host::mock::MockHidHost) in tests.
//!
//! # Sub-modules
//!
//! - **`manage_session`** – Owns the single active session: open, subscribe,
//!   unsubscribe, close, and cancellation of an in-flight attach.  Installs
//!   the report pipeline that decodes each raw report.
//!
//! - **`dispatch_reports`** – Fans decoded reports out to registered
//!   consumers in order, isolating consumer failures.
//!
//! - **`consumers`** – Built-in consumers: a text accumulator and a
//!   submit-on-Enter notifier.

pub mod consumers;
pub mod dispatch_reports;
pub mod manage_session;
