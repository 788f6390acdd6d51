//! Integration tests for the capture pipeline.
//!
//! These tests drive the public API the same way the binary does:
//! `SessionManager` + `MockHidHost` + the built-in consumers.  They cover
//! the full path from a raw report injected by the host to the text a
//! consumer accumulates:
//!
//! ```text
//! MockHidHost::inject_report ─▶ pipeline (decode) ─▶ ReportDispatcher
//!                                                     ├─▶ TextAccumulator
//!                                                     └─▶ SubmitNotifier
//! ```

use std::sync::{Arc, Mutex};

use hidkey_capture::application::consumers::{SubmitNotifier, TextAccumulator};
use hidkey_capture::application::dispatch_reports::ConsumerError;
use hidkey_capture::application::manage_session::{CaptureError, SessionManager, SessionState};
use hidkey_capture::infrastructure::hid_host::mock::MockHidHost;
use hidkey_capture::infrastructure::hid_host::HostError;
use hidkey_core::{Device, DeviceFilter, DeviceHandle, ModifierFlags};

const SHIFT: u8 = ModifierFlags::LEFT_SHIFT;

fn keyboard() -> Device {
    Device {
        handle: DeviceHandle(42),
        vendor_id: 0x046d,
        product_id: 0xc31c,
        product_name: Some("USB Keyboard".to_string()),
    }
}

fn boot(modifiers: u8, key: u8) -> [u8; 8] {
    [modifiers, 0, key, 0, 0, 0, 0, 0]
}

/// Sends a press report followed by an all-keys-up report.
fn tap(host: &MockHidHost, handle: DeviceHandle, modifiers: u8, key: u8) {
    host.inject_report(handle, 0, &boot(modifiers, key));
    host.inject_report(handle, 0, &[0u8; 8]);
}

// ── End-to-end text capture ───────────────────────────────────────────────────

#[tokio::test]
async fn test_selected_keyboard_types_into_accumulator() {
    // Arrange
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.set_selection(Some(device.handle));
    let manager = SessionManager::new(Arc::new(host.clone()));
    let text = TextAccumulator::new();
    manager.dispatcher().register(Box::new(text.clone()));

    // Act – "Hi!" then Enter
    let session = manager
        .request_and_attach(&[DeviceFilter::KEYBOARD])
        .await
        .expect("attach")
        .expect("device selected");
    tap(&host, device.handle, SHIFT, 0x0B);
    tap(&host, device.handle, 0, 0x0C);
    tap(&host, device.handle, SHIFT, 0x1E);
    tap(&host, device.handle, 0, 0x28);

    // Assert
    assert_eq!(session.device, device);
    assert_eq!(text.text(), "Hi!\n");
    assert_eq!(manager.known_devices(), vec![device]);
}

#[tokio::test]
async fn test_text_and_submit_consumers_share_one_stream() {
    // Arrange
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));

    let text = TextAccumulator::new();
    let submitted = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&submitted);
    manager.dispatcher().register(Box::new(text.clone()));
    manager
        .dispatcher()
        .register(Box::new(SubmitNotifier::new(move |line| {
            sink.lock().unwrap().push(line.to_string());
        })));

    // Act
    manager
        .attach_first_granted()
        .await
        .expect("attach")
        .expect("granted device");
    for key in [0x17, 0x08, 0x16, 0x17, 0x28] {
        tap(&host, device.handle, 0, key);
    }

    // Assert
    assert_eq!(text.text(), "test\n");
    assert_eq!(*submitted.lock().unwrap(), vec!["test".to_string()]);
}

#[tokio::test]
async fn test_fallback_keys_and_hid_reports_share_the_buffer() {
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));
    let text = TextAccumulator::new();
    manager.dispatcher().register(Box::new(text.clone()));
    manager.attach(&device).await.unwrap();

    tap(&host, device.handle, 0, 0x04);
    text.push_key("b");
    text.push_key("Control");

    assert_eq!(text.text(), "ab");
}

// ── Opaque reports ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_short_reports_reach_consumers_as_opaque() {
    // Arrange
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&payloads);
    manager.dispatcher().register_fn("opaque", move |report| {
        if let Some(bytes) = report.opaque_payload() {
            sink.lock().unwrap().push(bytes.to_vec());
        }
        Ok(())
    });
    manager.attach(&device).await.unwrap();

    // Act
    host.inject_report(device.handle, 3, &[0x01, 0x02]);
    host.inject_report(device.handle, 0, &boot(0, 0x04));

    // Assert
    assert_eq!(*payloads.lock().unwrap(), vec![vec![0x01, 0x02]]);
    assert_eq!(manager.last_report().map(|r| r.data.len()), Some(8));
}

// ── Failure isolation and recovery ────────────────────────────────────────────

#[tokio::test]
async fn test_panicking_consumer_does_not_stop_text_capture() {
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));
    manager.dispatcher().register_fn("panics", |report| {
        if report.key_codes().contains(&0x05) {
            panic!("consumer bug on 'b'");
        }
        Ok(())
    });
    manager
        .dispatcher()
        .register_fn("rejects", |_| Err(ConsumerError::Rejected("always".into())));
    let text = TextAccumulator::new();
    manager.dispatcher().register(Box::new(text.clone()));
    manager.attach(&device).await.unwrap();

    for key in [0x04, 0x05, 0x06] {
        tap(&host, device.handle, 0, key);
    }

    assert_eq!(text.text(), "abc");
    assert_eq!(manager.state(), SessionState::Attached);
}

#[tokio::test]
async fn test_reattach_after_open_failure() {
    // Arrange
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));
    host.fail_next_open(HostError::PermissionDenied(device.handle));

    // Act
    let first = manager.attach(&device).await;
    let second = manager.attach(&device).await;

    // Assert
    assert!(matches!(first, Err(CaptureError::OpenFailed { .. })));
    assert!(second.is_ok());
    assert_eq!(host.listener_count(device.handle), 1);
}

#[tokio::test]
async fn test_detach_then_reattach_gets_new_session() {
    let device = keyboard();
    let host = MockHidHost::new().with_device(device.clone());
    host.grant(device.handle);
    let manager = SessionManager::new(Arc::new(host.clone()));
    let text = TextAccumulator::new();
    manager.dispatcher().register(Box::new(text.clone()));

    let first = manager.attach(&device).await.unwrap();
    tap(&host, device.handle, 0, 0x04);
    manager.detach().await.unwrap();
    tap(&host, device.handle, 0, 0x05);
    let second = manager.attach(&device).await.unwrap();
    tap(&host, device.handle, 0, 0x06);

    assert_ne!(first.id, second.id);
    assert_eq!(text.text(), "ac", "reports while detached are not captured");
    assert_eq!(host.listener_count(device.handle), 1);
}

#[tokio::test]
async fn test_independent_managers_do_not_share_state() {
    // Two managers against two hosts, as parallel test runs would have.
    let device = keyboard();
    let host_a = MockHidHost::new().with_device(device.clone());
    let host_b = MockHidHost::new().with_device(device.clone());
    host_a.grant(device.handle);
    host_b.grant(device.handle);
    let manager_a = SessionManager::new(Arc::new(host_a.clone()));
    let manager_b = SessionManager::new(Arc::new(host_b.clone()));

    manager_a.attach(&device).await.unwrap();

    assert_eq!(manager_a.state(), SessionState::Attached);
    assert_eq!(manager_b.state(), SessionState::Idle);
    assert!(!host_b.device_open(device.handle));
}
