//! Remote document collections with server-initiated change notification.
//!
//! A collection is a [`ContactsEndpoint`] that can also open a standing change
//! channel. Each event on the channel carries the complete document set, the
//! first one arriving right after registration.

mod memory;
mod remote;

pub use memory::MemoryCollection;
pub use remote::{RemoteCollection, DEFAULT_IDLE_TIMEOUT};

use crate::endpoint::ContactsEndpoint;
use crate::error::Result;
use crate::types::Snapshot;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Default buffer for pushed snapshots awaiting delivery.
pub(crate) const FEED_BUFFER: usize = 16;

/// Endpoint with a push channel.
#[async_trait]
pub trait DocumentCollection: ContactsEndpoint {
    /// Open a change channel.
    async fn watch(&self) -> Result<ChangeFeed>;
}

/// Receiving end of a collection's change channel.
///
/// Dropping the feed closes the channel and stops any reader task behind it.
pub struct ChangeFeed {
    receiver: mpsc::Receiver<Snapshot>,
    reader: Option<AbortHandle>,
}

impl ChangeFeed {
    pub fn new(receiver: mpsc::Receiver<Snapshot>, reader: Option<AbortHandle>) -> Self {
        Self { receiver, reader }
    }

    /// Next pushed document set; `None` once the channel has closed.
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
