//! Polling backend.

use crate::endpoint::ContactsEndpoint;
use crate::error::{DirectoryError, Result};
use crate::repository::ContactRepository;
use crate::subscriptions::{SnapshotCallback, SnapshotFeed, Subscription, SubscriptionManager};
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::{log_missing, recover_read, write_failed};

const BACKEND: &str = "polling";

/// Repository over an endpoint that cannot push.
///
/// Each subscription fetches once immediately and then once per interval, so
/// a write reaches subscribers within one interval. With
/// `refetch_after_write` enabled, live subscriptions also refetch right
/// after every successful write.
pub struct PollingRepository<E: ContactsEndpoint> {
    endpoint: Arc<E>,
    interval: Duration,
    refetch_after_write: bool,
    /// Bumped after writes when `refetch_after_write` is set.
    writes: watch::Sender<u64>,
    subscriptions: SubscriptionManager,
}

impl<E: ContactsEndpoint> PollingRepository<E> {
    /// Must be called from within a Tokio runtime.
    pub fn new(endpoint: E, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(DirectoryError::Config("polling interval is zero".into()));
        }
        let (writes, _) = watch::channel(0);
        Ok(Self {
            endpoint: Arc::new(endpoint),
            interval,
            refetch_after_write: false,
            writes,
            subscriptions: SubscriptionManager::new()?,
        })
    }

    pub fn with_refetch_after_write(mut self, enabled: bool) -> Self {
        self.refetch_after_write = enabled;
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }

    fn wrote(&self) {
        if self.refetch_after_write {
            self.writes.send_modify(|n| *n += 1);
        }
    }
}

#[async_trait]
impl<E: ContactsEndpoint> ContactRepository for PollingRepository<E> {
    async fn get_all_contacts(&self) -> Snapshot {
        recover_read(BACKEND, self.endpoint.fetch_all().await)
    }

    fn subscribe_to_contacts(&self, callback: SnapshotCallback) -> Subscription {
        let feed = PollFeed {
            endpoint: Arc::clone(&self.endpoint),
            period: self.interval,
            timer: None,
            writes: self.writes.subscribe(),
            writes_open: true,
        };
        self.subscriptions.subscribe(feed, callback)
    }

    async fn add_contact(&self, data: ContactFormData) -> Result<ContactId> {
        let id = self
            .endpoint
            .create(&data, Utc::now())
            .await
            .map_err(|e| write_failed(BACKEND, "add", e))?;
        self.wrote();
        Ok(id)
    }

    async fn update_contact(&self, id: &ContactId, patch: ContactPatch) -> Result<()> {
        let applied = self
            .endpoint
            .update(id, &patch, Utc::now())
            .await
            .map_err(|e| write_failed(BACKEND, "update", e))?;
        if applied {
            self.wrote();
        } else {
            log_missing(BACKEND, "update", id);
        }
        Ok(())
    }

    async fn delete_contact(&self, id: &ContactId) -> Result<()> {
        let removed = self
            .endpoint
            .delete(id)
            .await
            .map_err(|e| write_failed(BACKEND, "delete", e))?;
        if removed {
            self.wrote();
        } else {
            log_missing(BACKEND, "delete", id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Fetch now, then on every tick (or write nudge).
struct PollFeed<E> {
    endpoint: Arc<E>,
    period: Duration,
    /// Armed after the initial fetch.
    timer: Option<Interval>,
    writes: watch::Receiver<u64>,
    writes_open: bool,
}

fn poll_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

impl<E> PollFeed<E> {
    async fn wait(&mut self) {
        let period = self.period;
        let timer = self.timer.get_or_insert_with(|| poll_timer(period));
        loop {
            tokio::select! {
                _ = timer.tick() => return,
                r = self.writes.changed(), if self.writes_open => match r {
                    Ok(()) => {
                        debug!(backend = BACKEND, "refetching after write");
                        return;
                    }
                    Err(_) => self.writes_open = false,
                },
            }
        }
    }
}

#[async_trait]
impl<E: ContactsEndpoint> SnapshotFeed for PollFeed<E> {
    async fn next_snapshot(&mut self) -> Option<Snapshot> {
        if self.timer.is_none() {
            let initial = recover_read(BACKEND, self.endpoint.fetch_all().await);
            // First tick is one period after the initial fetch completes.
            self.timer = Some(poll_timer(self.period));
            return Some(initial);
        }

        loop {
            self.wait().await;
            match self.endpoint.fetch_all().await {
                Ok(contacts) => return Some(contacts),
                Err(e) => {
                    warn!(backend = BACKEND, error = %e.into_read(), "poll failed, retrying next tick");
                }
            }
        }
    }
}
