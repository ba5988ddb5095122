//! Shared helpers for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use contact_sync::{Contact, ContactFormData, ContactId, Snapshot, SnapshotCallback};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Callback that forwards every snapshot into a channel.
pub fn collector() -> (SnapshotCallback, mpsc::UnboundedReceiver<Snapshot>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: SnapshotCallback = Arc::new(move |snapshot| {
        let _ = tx.send(snapshot);
    });
    (callback, rx)
}

/// Next delivered snapshot, failing the test after `within`.
pub async fn next_within(rx: &mut mpsc::UnboundedReceiver<Snapshot>, within: Duration) -> Snapshot {
    tokio::time::timeout(within, rx.recv())
        .await
        .expect("timed out waiting for snapshot")
        .expect("subscription closed")
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<Snapshot>) -> Snapshot {
    next_within(rx, Duration::from_secs(5)).await
}

/// Assert nothing is delivered for `window`.
pub async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Snapshot>, window: Duration) {
    if let Ok(Some(snapshot)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected snapshot with {} contacts", snapshot.len());
    }
}

pub fn form(org: &str, name: &str) -> ContactFormData {
    ContactFormData {
        organization: org.into(),
        name: name.into(),
        whatsapp: "081234567890".into(),
        telegram_id: "@handle".into(),
        is_active: true,
        notes: String::new(),
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Contact created `offset_secs` after [`base_time`].
pub fn contact_at(id: &str, name: &str, offset_secs: i64) -> Contact {
    Contact::create(
        ContactId::from(id),
        form("Acme", name),
        base_time() + ChronoDuration::seconds(offset_secs),
    )
}

pub fn names(snapshot: &Snapshot) -> Vec<&str> {
    snapshot.iter().map(|c| c.name.as_str()).collect()
}

/// Route log output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
