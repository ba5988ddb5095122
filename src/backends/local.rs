//! Local-broadcast backend.
//!
//! One blob holds every contact. Each write is a read-modify-write of the
//! whole blob followed by two signals: one on this context's in-process bus
//! and one on the cross-context channel. The cycle is not locked end to end,
//! so two contexts writing at once resolve as last-writer-wins.

use crate::blobs::{decode_contacts, encode_contacts, validate_key, BlobStore};
use crate::error::Result;
use crate::repository::ContactRepository;
use crate::signals::{ChangeSignal, ContextId, SignalChannel};
use crate::subscriptions::{SnapshotCallback, SnapshotFeed, Subscription, SubscriptionManager};
use crate::types::{Contact, ContactFormData, ContactId, ContactPatch, Snapshot};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, warn};

use super::{log_missing, recover_read, write_failed};

const BACKEND: &str = "local";

struct Shared {
    blobs: Arc<dyn BlobStore>,
    key: String,
    context: ContextId,
    /// Same-context change bus.
    local_bus: broadcast::Sender<()>,
    /// Cross-context change channel.
    signals: Arc<dyn SignalChannel>,
    seq: AtomicU64,
}

impl Shared {
    async fn read_all(&self) -> Result<Snapshot> {
        let bytes = self.blobs.load(&self.key).await?;
        decode_contacts(bytes.as_deref())
    }

    /// Read-modify-write of the whole blob.
    ///
    /// `apply` reports whether it changed anything; unchanged sets are
    /// neither written back nor announced.
    async fn mutate<F>(&self, op: &'static str, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<Contact>) -> bool + Send,
    {
        let mut contacts = self
            .read_all()
            .await
            .map_err(|e| write_failed(BACKEND, op, e))?;

        if !apply(&mut contacts) {
            return Ok(false);
        }

        let bytes = encode_contacts(&contacts).map_err(|e| write_failed(BACKEND, op, e))?;
        self.blobs
            .save(&self.key, bytes)
            .await
            .map_err(|e| write_failed(BACKEND, op, e))?;

        self.announce().await;
        Ok(true)
    }

    async fn announce(&self) {
        // No same-context subscribers is fine.
        let _ = self.local_bus.send(());

        let signal = ChangeSignal {
            origin: self.context.clone(),
            key: self.key.clone(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        };
        if let Err(e) = self.signals.post(signal).await {
            // The blob is already written; other contexts catch up on their next signal.
            warn!(backend = BACKEND, error = %e, "failed to post cross-context signal");
        }
    }
}

/// Repository over a single shared blob.
///
/// Several repositories may share one [`BlobStore`] and one
/// [`SignalChannel`]; each is a separate context with its own [`ContextId`].
pub struct LocalRepository {
    shared: Arc<Shared>,
    subscriptions: SubscriptionManager,
}

impl LocalRepository {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        signals: Arc<dyn SignalChannel>,
        key: impl Into<String>,
    ) -> Result<Self> {
        Self::with_context(blobs, signals, key, ContextId::generate())
    }

    pub fn with_context(
        blobs: Arc<dyn BlobStore>,
        signals: Arc<dyn SignalChannel>,
        key: impl Into<String>,
        context: ContextId,
    ) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        let (local_bus, _) = broadcast::channel(64);
        Ok(Self {
            shared: Arc::new(Shared {
                blobs,
                key,
                context,
                local_bus,
                signals,
                // Seeded from the clock so a restarted context never repeats a signal.
                seq: AtomicU64::new(Utc::now().timestamp_micros().max(1) as u64),
            }),
            subscriptions: SubscriptionManager::new()?,
        })
    }

    pub fn context(&self) -> &ContextId {
        &self.shared.context
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.subscription_count()
    }
}

#[async_trait]
impl ContactRepository for LocalRepository {
    async fn get_all_contacts(&self) -> Snapshot {
        recover_read(BACKEND, self.shared.read_all().await)
    }

    fn subscribe_to_contacts(&self, callback: SnapshotCallback) -> Subscription {
        let feed = LocalFeed {
            shared: Arc::clone(&self.shared),
            listeners: None,
            cross_context_open: true,
        };
        self.subscriptions.subscribe(feed, callback)
    }

    async fn add_contact(&self, data: ContactFormData) -> Result<ContactId> {
        let id = ContactId::generate();
        let contact = Contact::create(id.clone(), data, Utc::now());
        self.shared
            .mutate("add", move |contacts| {
                contacts.push(contact);
                true
            })
            .await?;
        debug!(backend = BACKEND, contact_id = %id, "contact added");
        Ok(id)
    }

    async fn update_contact(&self, id: &ContactId, patch: ContactPatch) -> Result<()> {
        let now = Utc::now();
        let target = id.clone();
        let applied = self
            .shared
            .mutate("update", move |contacts| {
                match contacts.iter_mut().find(|c| c.id == target) {
                    Some(contact) => {
                        contact.apply(&patch, now);
                        true
                    }
                    None => false,
                }
            })
            .await?;
        if !applied {
            log_missing(BACKEND, "update", id);
        }
        Ok(())
    }

    async fn delete_contact(&self, id: &ContactId) -> Result<()> {
        let target = id.clone();
        let removed = self
            .shared
            .mutate("delete", move |contacts| {
                let before = contacts.len();
                contacts.retain(|c| c.id != target);
                contacts.len() != before
            })
            .await?;
        if !removed {
            log_missing(BACKEND, "delete", id);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }
}

/// Re-reads the blob whenever either signal fires.
struct LocalFeed {
    shared: Arc<Shared>,
    /// Registered on the first call, before the initial read.
    listeners: Option<(broadcast::Receiver<()>, broadcast::Receiver<ChangeSignal>)>,
    cross_context_open: bool,
}

impl LocalFeed {
    /// Wait for a change relevant to this context. `false` if the source closed.
    async fn changed(&mut self) -> bool {
        let shared = Arc::clone(&self.shared);
        let Some((local, remote)) = self.listeners.as_mut() else {
            return false;
        };
        loop {
            tokio::select! {
                r = local.recv() => match r {
                    Ok(()) | Err(RecvError::Lagged(_)) => return true,
                    Err(RecvError::Closed) => return false,
                },
                r = remote.recv(), if self.cross_context_open => match r {
                    Ok(signal) => {
                        if signal.origin != shared.context && signal.key == shared.key {
                            return true;
                        }
                    }
                    Err(RecvError::Lagged(_)) => return true,
                    Err(RecvError::Closed) => {
                        warn!(backend = BACKEND, "cross-context channel closed");
                        self.cross_context_open = false;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl SnapshotFeed for LocalFeed {
    async fn next_snapshot(&mut self) -> Option<Snapshot> {
        if self.listeners.is_none() {
            self.listeners = Some((
                self.shared.local_bus.subscribe(),
                self.shared.signals.listen(),
            ));
            return Some(recover_read(BACKEND, self.shared.read_all().await));
        }

        loop {
            if !self.changed().await {
                return None;
            }
            match self.shared.read_all().await {
                Ok(contacts) => return Some(contacts),
                Err(e) => {
                    error!(backend = BACKEND, error = %e.into_read(), "snapshot refresh failed");
                }
            }
        }
    }
}
