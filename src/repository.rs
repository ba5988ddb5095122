//! The contract every backend implements.

use crate::error::Result;
use crate::subscriptions::{SnapshotCallback, Subscription};
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use async_trait::async_trait;

/// Four-operation directory contract plus live subscriptions.
///
/// Object safe, so a backend chosen at startup can be held as
/// `Arc<dyn ContactRepository>` for the life of the process.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Full current set, newest first.
    ///
    /// Never fails: read errors are logged and yield an empty set.
    async fn get_all_contacts(&self) -> Snapshot;

    /// Register `callback` for an initial snapshot and one per detected change.
    fn subscribe_to_contacts(&self, callback: SnapshotCallback) -> Subscription;

    /// Create a record; both timestamps are set to now.
    async fn add_contact(&self, data: ContactFormData) -> Result<ContactId>;

    /// Merge `patch` onto an existing record. Unknown ids are ignored.
    async fn update_contact(&self, id: &ContactId, patch: ContactPatch) -> Result<()>;

    /// Remove a record. Unknown ids are ignored.
    async fn delete_contact(&self, id: &ContactId) -> Result<()>;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}
