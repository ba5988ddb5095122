//! Push-subscription backend.

use crate::collections::{ChangeFeed, DocumentCollection};
use crate::error::{DirectoryError, Result};
use crate::repository::ContactRepository;
use crate::subscriptions::{SnapshotCallback, SnapshotFeed, Subscription, SubscriptionManager};
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{log_missing, recover_read, write_failed};

const BACKEND: &str = "push";

/// Default wait before reopening a dropped change channel.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Default bound on opening a change channel and receiving its first event.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Repository over a store that pushes its changes.
///
/// Writes go straight to the collection; subscribers (the writer's own
/// included) see them once the collection pushes the new document set.
pub struct PushRepository<C: DocumentCollection> {
    collection: Arc<C>,
    subscriptions: SubscriptionManager,
    reconnect_delay: Duration,
    open_timeout: Duration,
}

impl<C: DocumentCollection> PushRepository<C> {
    /// Must be called from within a Tokio runtime.
    pub fn new(collection: C) -> Result<Self> {
        Ok(Self {
            collection: Arc::new(collection),
            subscriptions: SubscriptionManager::new()?,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        })
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// How long a subscription waits for the change channel before it
    /// delivers a fetched snapshot instead.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }
}

#[async_trait]
impl<C: DocumentCollection> ContactRepository for PushRepository<C> {
    async fn get_all_contacts(&self) -> Snapshot {
        recover_read(BACKEND, self.collection.fetch_all().await)
    }

    fn subscribe_to_contacts(&self, callback: SnapshotCallback) -> Subscription {
        let feed = PushFeed {
            collection: Arc::clone(&self.collection),
            channel: None,
            delivered: false,
            reconnect_delay: self.reconnect_delay,
            open_timeout: self.open_timeout,
        };
        self.subscriptions.subscribe(feed, callback)
    }

    async fn add_contact(&self, data: ContactFormData) -> Result<ContactId> {
        self.collection
            .create(&data, Utc::now())
            .await
            .map_err(|e| write_failed(BACKEND, "add", e))
    }

    async fn update_contact(&self, id: &ContactId, patch: ContactPatch) -> Result<()> {
        let applied = self
            .collection
            .update(id, &patch, Utc::now())
            .await
            .map_err(|e| write_failed(BACKEND, "update", e))?;
        if !applied {
            log_missing(BACKEND, "update", id);
        }
        Ok(())
    }

    async fn delete_contact(&self, id: &ContactId) -> Result<()> {
        let removed = self
            .collection
            .delete(id)
            .await
            .map_err(|e| write_failed(BACKEND, "delete", e))?;
        if !removed {
            log_missing(BACKEND, "delete", id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Keeps one change channel open for a subscription, reopening it when it drops.
///
/// Until the first snapshot has gone out, every wait on the channel is bounded
/// by `open_timeout`; on expiry the current set is fetched and delivered
/// instead, and the channel keeps being retried.
struct PushFeed<C> {
    collection: Arc<C>,
    channel: Option<ChangeFeed>,
    delivered: bool,
    reconnect_delay: Duration,
    open_timeout: Duration,
}

impl<C: DocumentCollection> PushFeed<C> {
    async fn initial_fallback(&mut self) -> Snapshot {
        self.delivered = true;
        match tokio::time::timeout(self.open_timeout, self.collection.fetch_all()).await {
            Ok(result) => recover_read(BACKEND, result),
            Err(_) => {
                error!(backend = BACKEND, "initial fetch timed out");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl<C: DocumentCollection> SnapshotFeed for PushFeed<C> {
    async fn next_snapshot(&mut self) -> Option<Snapshot> {
        loop {
            if self.channel.is_none() {
                let opened = match tokio::time::timeout(self.open_timeout, self.collection.watch())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DirectoryError::Transport(format!(
                        "change channel not open after {:?}",
                        self.open_timeout
                    ))),
                };
                match opened {
                    Ok(channel) => self.channel = Some(channel),
                    Err(e) => {
                        error!(backend = BACKEND, error = %e, "failed to open change channel");
                        if !self.delivered {
                            return Some(self.initial_fallback().await);
                        }
                        tokio::time::sleep(self.reconnect_delay).await;
                        continue;
                    }
                }
            }

            let channel = self.channel.as_mut()?;
            let next = if self.delivered {
                channel.next().await
            } else {
                match tokio::time::timeout(self.open_timeout, channel.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(backend = BACKEND, "no event on change channel yet, fetching");
                        return Some(self.initial_fallback().await);
                    }
                }
            };
            match next {
                Some(snapshot) => {
                    self.delivered = true;
                    return Some(snapshot);
                }
                None => {
                    warn!(backend = BACKEND, "change channel dropped, reopening");
                    self.channel = None;
                    tokio::time::sleep(self.reconnect_delay).await;
                    info!(backend = BACKEND, "reopening change channel");
                }
            }
        }
    }
}
