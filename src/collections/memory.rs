//! In-process document collection.

use crate::error::Result;
use crate::types::{Contact, ContactFormData, ContactId, ContactPatch, Snapshot, sort_newest_first};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::trace;

use super::{ChangeFeed, DocumentCollection, FEED_BUFFER};
use crate::endpoint::ContactsEndpoint;

struct Inner {
    documents: RwLock<HashMap<ContactId, Contact>>,
    /// Fires after every applied write.
    changes: broadcast::Sender<()>,
}

impl Inner {
    /// Current documents, ordered server-side.
    fn ordered(&self) -> Snapshot {
        let mut docs: Snapshot = self.documents.read().values().cloned().collect();
        sort_newest_first(&mut docs);
        docs
    }

    fn notify(&self) {
        // No receivers is fine.
        let _ = self.changes.send(());
    }
}

/// A document collection held in memory.
///
/// Behaves like a push-capable remote store: it assigns ids, orders query
/// results by creation time, and pushes the full document set to every open
/// channel after each write. Clones share the same documents.
#[derive(Clone)]
pub struct MemoryCollection {
    inner: Arc<Inner>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                documents: RwLock::new(HashMap::new()),
                changes,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open change channels.
    pub fn watcher_count(&self) -> usize {
        self.inner.changes.receiver_count()
    }

    /// Insert a fully formed record, replacing any with the same id.
    pub fn seed(&self, contact: Contact) {
        self.inner
            .documents
            .write()
            .insert(contact.id.clone(), contact);
        self.inner.notify();
    }
}

impl Default for MemoryCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContactsEndpoint for MemoryCollection {
    async fn fetch_all(&self) -> Result<Snapshot> {
        Ok(self.inner.ordered())
    }

    async fn create(&self, data: &ContactFormData, now: DateTime<Utc>) -> Result<ContactId> {
        let id = ContactId::generate();
        let contact = Contact::create(id.clone(), data.clone(), now);
        self.inner.documents.write().insert(id.clone(), contact);
        trace!(contact_id = %id, "document created");
        self.inner.notify();
        Ok(id)
    }

    async fn update(
        &self,
        id: &ContactId,
        patch: &ContactPatch,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let applied = match self.inner.documents.write().get_mut(id) {
            Some(contact) => {
                contact.apply(patch, now);
                true
            }
            None => false,
        };
        if applied {
            self.inner.notify();
        }
        Ok(applied)
    }

    async fn delete(&self, id: &ContactId) -> Result<bool> {
        let removed = self.inner.documents.write().remove(id).is_some();
        if removed {
            self.inner.notify();
        }
        Ok(removed)
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    async fn watch(&self) -> Result<ChangeFeed> {
        // Subscribe before reading so no write slips between the two.
        let mut changes = self.inner.changes.subscribe();
        let inner = Arc::clone(&self.inner);
        let (tx, rx) = mpsc::channel(FEED_BUFFER);

        let reader = tokio::spawn(async move {
            if tx.send(inner.ordered()).await.is_err() {
                return;
            }
            loop {
                match changes.recv().await {
                    // A lagged receiver only missed ticks; the next read is complete anyway.
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        if tx.send(inner.ordered()).await.is_err() {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        Ok(ChangeFeed::new(rx, Some(reader.abort_handle())))
    }
}
