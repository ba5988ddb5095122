//! Subscription dispatcher: one task per subscription.

use crate::error::{DirectoryError, Result};
use crate::types::sort_newest_first;
use parking_lot::{Mutex, RwLock};
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, error, trace};

use super::types::{SnapshotCallback, SnapshotFeed, Subscription, SubscriptionId};

thread_local! {
    /// Set while this thread runs a subscription callback.
    static IN_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is inside a subscription callback.
pub(super) fn in_callback() -> bool {
    IN_CALLBACK.with(Cell::get)
}

/// Marks the current thread as running a callback until dropped, unwinding included.
struct CallbackScope {
    previous: bool,
}

impl CallbackScope {
    fn enter() -> Self {
        Self {
            previous: IN_CALLBACK.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for CallbackScope {
    fn drop(&mut self) {
        let previous = self.previous;
        IN_CALLBACK.with(|flag| flag.set(previous));
    }
}

/// Internal subscription state.
struct Entry {
    active: Arc<AtomicBool>,
    gate: Arc<Mutex<()>>,
    /// Delivery task; `None` only while the task is being spawned.
    task: Option<AbortHandle>,
}

/// Active subscriptions by ID.
pub(crate) struct Registry {
    entries: RwLock<HashMap<SubscriptionId, Entry>>,
}

impl Registry {
    /// Remove a subscription and stop its task.
    pub(crate) fn cancel(&self, id: SubscriptionId) {
        let entry = self.entries.write().remove(&id);
        if let Some(entry) = entry {
            entry.active.store(false, Ordering::Release);
            if let Some(task) = entry.task {
                task.abort();
            }
            debug!(subscription = %id, "subscription cancelled");
        }
    }

    /// Forget a subscription whose feed closed on its own.
    fn finish(&self, id: SubscriptionId) {
        if let Some(entry) = self.entries.write().remove(&id) {
            entry.active.store(false, Ordering::Release);
        }
    }
}

/// Manages subscriptions and drives their feeds.
///
/// Guarantees every subscription one initial delivery, orders every delivered
/// snapshot newest first, and tears the feed down on unsubscribe.
pub struct SubscriptionManager {
    registry: Arc<Registry>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    runtime: Handle,
}

impl SubscriptionManager {
    /// Create a manager bound to the current Tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| DirectoryError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    /// Create a manager that spawns its tasks on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            registry: Arc::new(Registry {
                entries: RwLock::new(HashMap::new()),
            }),
            next_id: AtomicU64::new(1),
            runtime,
        }
    }

    /// Start delivering snapshots from `feed` to `callback`.
    ///
    /// The first snapshot is delivered as soon as the feed yields it; a feed
    /// that closes before yielding anything still delivers an empty snapshot.
    pub fn subscribe<F>(&self, mut feed: F, callback: SnapshotCallback) -> Subscription
    where
        F: SnapshotFeed,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let active = Arc::new(AtomicBool::new(true));
        let gate = Arc::new(Mutex::new(()));

        self.registry.entries.write().insert(
            id,
            Entry {
                active: Arc::clone(&active),
                gate: Arc::clone(&gate),
                task: None,
            },
        );

        let registry = Arc::downgrade(&self.registry);
        let task_active = Arc::clone(&active);
        let task_gate = Arc::clone(&gate);
        let handle = self.runtime.spawn(async move {
            let deliver = |mut snapshot: crate::types::Snapshot| {
                let _gate = task_gate.lock();
                if !task_active.load(Ordering::Acquire) {
                    return false;
                }
                sort_newest_first(&mut snapshot);
                trace!(subscription = %id, contacts = snapshot.len(), "delivering snapshot");
                let outcome = {
                    let _scope = CallbackScope::enter();
                    panic::catch_unwind(AssertUnwindSafe(|| callback(snapshot)))
                };
                if outcome.is_err() {
                    error!(subscription = %id, "subscription callback panicked, ending subscription");
                    task_active.store(false, Ordering::Release);
                    return false;
                }
                task_active.load(Ordering::Acquire)
            };

            let initial = feed.next_snapshot().await.unwrap_or_default();
            if deliver(initial) {
                while let Some(snapshot) = feed.next_snapshot().await {
                    if !deliver(snapshot) {
                        break;
                    }
                }
            }

            if let Some(registry) = registry.upgrade() {
                registry.finish(id);
            }
            debug!(subscription = %id, "subscription feed ended");
        });

        let mut entries = self.registry.entries.write();
        match entries.get_mut(&id) {
            Some(entry) => entry.task = Some(handle.abort_handle()),
            // Cancelled or finished before we got here.
            None => handle.abort(),
        }
        drop(entries);

        debug!(subscription = %id, "subscription started");
        Subscription {
            id,
            active,
            gate,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.entries.read().len()
    }

    /// Cancel every subscription.
    pub fn unsubscribe_all(&self) {
        let entries: Vec<(SubscriptionId, Entry)> =
            self.registry.entries.write().drain().collect();
        for (id, entry) in entries {
            {
                let _gate = entry.gate.lock();
                entry.active.store(false, Ordering::Release);
            }
            if let Some(task) = entry.task {
                task.abort();
            }
            debug!(subscription = %id, "subscription cancelled on shutdown");
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.unsubscribe_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Contact, ContactFormData, ContactId, Snapshot};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelFeed(mpsc::UnboundedReceiver<Snapshot>);

    #[async_trait]
    impl SnapshotFeed for ChannelFeed {
        async fn next_snapshot(&mut self) -> Option<Snapshot> {
            self.0.recv().await
        }
    }

    fn contact(id: &str, secs: i64) -> Contact {
        Contact::create(
            ContactId::from(id),
            ContactFormData::default(),
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    fn recorder() -> (SnapshotCallback, Arc<Mutex<Vec<Snapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SnapshotCallback = Arc::new(move |s| sink.lock().push(s));
        (callback, seen)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let (callback, seen) = recorder();

        let sub = manager.subscribe(ChannelFeed(rx), callback);
        assert_eq!(manager.subscription_count(), 1);

        tx.send(vec![contact("a", 1)]).unwrap();
        settle().await;
        assert_eq!(seen.lock().len(), 1);

        sub.unsubscribe();
        assert_eq!(manager.subscription_count(), 0);
        assert!(!sub.is_active());

        // Second call is a no-op.
        sub.unsubscribe();

        let _ = tx.send(vec![]);
        settle().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshots_are_sorted() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let (callback, seen) = recorder();
        let _sub = manager.subscribe(ChannelFeed(rx), callback);

        tx.send(vec![contact("old", 1), contact("new", 3), contact("mid", 2)])
            .unwrap();
        settle().await;

        let seen = seen.lock();
        let ids: Vec<_> = seen[0].iter().map(|c| c.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_closed_feed_still_delivers_empty_snapshot() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel::<Snapshot>();
        drop(tx);
        let (callback, seen) = recorder();

        let _sub = manager.subscribe(ChannelFeed(rx), callback);
        settle().await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_empty());
        drop(seen);
        assert_eq!(manager.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_from_inside_callback() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let cb_slot = Arc::clone(&slot);
        let cb_calls = Arc::clone(&calls);
        let callback: SnapshotCallback = Arc::new(move |_: Snapshot| {
            cb_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(sub) = cb_slot.lock().as_ref() {
                sub.unsubscribe();
            }
        });

        let sub = manager.subscribe(ChannelFeed(rx), callback);
        *slot.lock() = Some(sub.clone());

        tx.send(vec![]).unwrap();
        settle().await;
        let _ = tx.send(vec![]);
        let _ = tx.send(vec![]);
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!sub.is_active());
        assert_eq!(manager.subscription_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_callbacks_may_unsubscribe_each_other() {
        let manager = SubscriptionManager::new().unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let slot_a: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let slot_b: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // Each callback waits for the other to be running, then cancels it.
        let cancels = |other: Arc<Mutex<Option<Subscription>>>| -> SnapshotCallback {
            let barrier = Arc::clone(&barrier);
            Arc::new(move |_: Snapshot| {
                barrier.wait();
                let other = other.lock().clone();
                if let Some(other) = other {
                    other.unsubscribe();
                }
            })
        };

        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let sub_a = manager.subscribe(ChannelFeed(rx_a), cancels(Arc::clone(&slot_b)));
        let sub_b = manager.subscribe(ChannelFeed(rx_b), cancels(Arc::clone(&slot_a)));
        *slot_a.lock() = Some(sub_a.clone());
        *slot_b.lock() = Some(sub_b.clone());

        tx_a.send(vec![]).unwrap();
        tx_b.send(vec![]).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.subscription_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("callbacks deadlocked");
        assert!(!sub_a.is_active());
        assert!(!sub_b.is_active());
    }

    #[tokio::test]
    async fn test_panicking_callback_ends_subscription() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SnapshotCallback = Arc::new(|_: Snapshot| panic!("callback failure"));

        let sub = manager.subscribe(ChannelFeed(rx), callback);
        tx.send(vec![]).unwrap();
        settle().await;

        assert!(!sub.is_active());
        assert_eq!(manager.subscription_count(), 0);
        // Still harmless afterwards.
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn test_subscriptions_are_independent() {
        let manager = SubscriptionManager::new().unwrap();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        let (cb1, seen1) = recorder();
        let (cb2, seen2) = recorder();

        let sub1 = manager.subscribe(ChannelFeed(rx1), cb1);
        let _sub2 = manager.subscribe(ChannelFeed(rx2), cb2);

        tx1.send(vec![]).unwrap();
        tx2.send(vec![]).unwrap();
        settle().await;
        sub1.unsubscribe();

        let _ = tx1.send(vec![]);
        tx2.send(vec![contact("x", 1)]).unwrap();
        settle().await;

        assert_eq!(seen1.lock().len(), 1);
        assert_eq!(seen2.lock().len(), 2);
        assert_eq!(manager.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_manager_cancels_all() {
        let manager = SubscriptionManager::new().unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let (callback, _seen) = recorder();
        let sub = manager.subscribe(ChannelFeed(rx), callback);

        drop(manager);
        assert!(!sub.is_active());
        // Registry is gone; unsubscribe must still be harmless.
        sub.unsubscribe();
    }
}
