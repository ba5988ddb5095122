//! Subscription types for live directory updates.

use crate::types::Snapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use super::manager::{in_callback, Registry};

/// Callback receiving every delivered snapshot.
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Source of snapshots for one subscription.
///
/// Each backend provides its own feed: a push channel, a pair of change
/// signals, or a timer. The dispatcher drives it from a dedicated task.
#[async_trait]
pub trait SnapshotFeed: Send + 'static {
    /// Wait for the next snapshot to deliver.
    ///
    /// The first call should resolve promptly with whatever data is available.
    /// Returns `None` once the source is closed for good.
    async fn next_snapshot(&mut self) -> Option<Snapshot>;
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a live subscription.
///
/// Cloning the handle is cheap; every clone controls the same subscription.
/// Dropping it does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    pub(super) id: SubscriptionId,
    pub(super) active: Arc<AtomicBool>,
    /// Held while the callback runs.
    pub(super) gate: Arc<Mutex<()>>,
    pub(super) registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Whether the callback may still be invoked.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop deliveries and release the resources held by this subscription.
    ///
    /// Idempotent, and safe to call from inside any subscription's callback.
    /// Once this returns the callback is not invoked again. Called from outside
    /// a callback, it also waits for an in-flight delivery to finish; from
    /// inside one it does not, since that delivery may be waiting on us.
    pub fn unsubscribe(&self) {
        let was_active = if in_callback() {
            self.active.swap(false, Ordering::AcqRel)
        } else {
            let _gate = self.gate.lock();
            self.active.swap(false, Ordering::AcqRel)
        };
        if was_active {
            if let Some(registry) = self.registry.upgrade() {
                registry.cancel(self.id);
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
