//! Polling backend tests. Time is paused, so intervals elapse instantly
//! whenever every task is idle.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{collector, contact_at, form, init_tracing, names, next_within};
use contact_sync::{
    ContactFormData, ContactId, ContactPatch, ContactRepository, ContactsEndpoint,
    DirectoryError, MemoryCollection, PollingRepository, Result, Snapshot,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const INTERVAL: Duration = Duration::from_secs(5);
const PATIENCE: Duration = Duration::from_secs(60);

/// Endpoint whose reads can be switched off.
#[derive(Clone, Default)]
struct FlakyEndpoint {
    inner: MemoryCollection,
    failing: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl ContactsEndpoint for FlakyEndpoint {
    async fn fetch_all(&self) -> Result<Snapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport("connection reset".into()));
        }
        self.inner.fetch_all().await
    }

    async fn create(&self, data: &ContactFormData, now: DateTime<Utc>) -> Result<ContactId> {
        self.inner.create(data, now).await
    }

    async fn update(&self, id: &ContactId, patch: &ContactPatch, now: DateTime<Utc>) -> Result<bool> {
        self.inner.update(id, patch, now).await
    }

    async fn delete(&self, id: &ContactId) -> Result<bool> {
        self.inner.delete(id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_initial_fetch_is_immediate() {
    let endpoint = MemoryCollection::new();
    endpoint.seed(contact_at("a", "Jane", 0));
    let repo = PollingRepository::new(endpoint, INTERVAL).unwrap();

    let start = Instant::now();
    let (callback, mut rx) = collector();
    let _sub = repo.subscribe_to_contacts(callback);

    let snapshot = next_within(&mut rx, PATIENCE).await;
    assert_eq!(names(&snapshot), vec!["Jane"]);
    assert!(start.elapsed() < INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_write_visible_within_one_interval() {
    let repo = PollingRepository::new(MemoryCollection::new(), INTERVAL).unwrap();

    let start = Instant::now();
    let (callback, mut rx) = collector();
    let _sub = repo.subscribe_to_contacts(callback);
    assert!(next_within(&mut rx, PATIENCE).await.is_empty());

    repo.add_contact(form("Acme", "Jane")).await.unwrap();
    let snapshot = next_within(&mut rx, PATIENCE).await;
    assert_eq!(names(&snapshot), vec!["Jane"]);

    let elapsed = start.elapsed();
    assert!(elapsed >= INTERVAL, "delivered after {elapsed:?}");
    assert!(elapsed < INTERVAL * 2, "delivered after {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_every_tick_delivers() {
    let repo = PollingRepository::new(MemoryCollection::new(), INTERVAL).unwrap();

    let start = Instant::now();
    let (callback, mut rx) = collector();
    let _sub = repo.subscribe_to_contacts(callback);
    next_within(&mut rx, PATIENCE).await;

    for tick in 1..=3u32 {
        next_within(&mut rx, PATIENCE).await;
        assert!(start.elapsed() >= INTERVAL * tick);
    }
}

#[tokio::test(start_paused = true)]
async fn test_refetch_after_write() {
    let repo = PollingRepository::new(MemoryCollection::new(), INTERVAL)
        .unwrap()
        .with_refetch_after_write(true);

    let start = Instant::now();
    let (callback, mut rx) = collector();
    let _sub = repo.subscribe_to_contacts(callback);
    next_within(&mut rx, PATIENCE).await;

    repo.add_contact(form("Acme", "Jane")).await.unwrap();
    let snapshot = next_within(&mut rx, PATIENCE).await;
    assert_eq!(names(&snapshot), vec!["Jane"]);
    assert!(start.elapsed() < INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_failed_tick_keeps_subscription() {
    init_tracing();
    let endpoint = FlakyEndpoint::default();
    let repo = PollingRepository::new(endpoint.clone(), INTERVAL).unwrap();

    let (callback, mut rx) = collector();
    let sub = repo.subscribe_to_contacts(callback);
    assert!(next_within(&mut rx, PATIENCE).await.is_empty());

    endpoint.failing.store(true, Ordering::SeqCst);
    endpoint.inner.seed(contact_at("a", "Jane", 0));
    tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err(), "failed ticks must not deliver");
    assert!(endpoint.fetches.load(Ordering::SeqCst) >= 3);
    assert!(sub.is_active());

    endpoint.failing.store(false, Ordering::SeqCst);
    let snapshot = next_within(&mut rx, PATIENCE).await;
    assert_eq!(names(&snapshot), vec!["Jane"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_initial_fetch_delivers_empty() {
    let endpoint = FlakyEndpoint::default();
    endpoint.inner.seed(contact_at("a", "Jane", 0));
    endpoint.failing.store(true, Ordering::SeqCst);
    let repo = PollingRepository::new(endpoint.clone(), INTERVAL).unwrap();

    assert!(repo.get_all_contacts().await.is_empty());

    let (callback, mut rx) = collector();
    let _sub = repo.subscribe_to_contacts(callback);
    assert!(next_within(&mut rx, PATIENCE).await.is_empty());

    endpoint.failing.store(false, Ordering::SeqCst);
    assert_eq!(names(&next_within(&mut rx, PATIENCE).await), vec!["Jane"]);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_polling() {
    let endpoint = FlakyEndpoint::default();
    let repo = PollingRepository::new(endpoint.clone(), INTERVAL).unwrap();

    let (callback, mut rx) = collector();
    let sub = repo.subscribe_to_contacts(callback);
    next_within(&mut rx, PATIENCE).await;
    sub.unsubscribe();
    let fetched = endpoint.fetches.load(Ordering::SeqCst);

    tokio::time::sleep(INTERVAL * 4).await;
    assert_eq!(endpoint.fetches.load(Ordering::SeqCst), fetched);
    assert_eq!(repo.subscription_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_update_keeps_created_at() {
    let repo = PollingRepository::new(MemoryCollection::new(), INTERVAL).unwrap();
    let id = repo.add_contact(form("Acme", "Jane")).await.unwrap();
    let before = repo.get_all_contacts().await[0].clone();

    repo.update_contact(&id, ContactPatch::default().telegram_id("jane_d"))
        .await
        .unwrap();
    let after = repo.get_all_contacts().await[0].clone();
    assert_eq!(after.telegram_id, "jane_d");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);

    // Unknown ids are a silent no-op.
    repo.delete_contact(&ContactId::from("ghost")).await.unwrap();
    assert_eq!(repo.get_all_contacts().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_added_record_matches_submitted_form() {
    let repo = PollingRepository::new(MemoryCollection::new(), INTERVAL).unwrap();
    let data = ContactFormData {
        whatsapp: "+62 812 0000".into(),
        ..form("Acme", "Jane")
    };

    let id = repo.add_contact(data.clone()).await.unwrap();
    let all = repo.get_all_contacts().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert_eq!(all[0].form_data(), data);
    assert_eq!(all[0].created_at, all[0].updated_at);

    repo.delete_contact(&id).await.unwrap();
    repo.delete_contact(&id).await.unwrap();
    assert!(repo.get_all_contacts().await.is_empty());
}

#[tokio::test]
async fn test_zero_interval_rejected() {
    let result = PollingRepository::new(MemoryCollection::new(), Duration::ZERO);
    assert!(matches!(result, Err(DirectoryError::Config(_))));
}
