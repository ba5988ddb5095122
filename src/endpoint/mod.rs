//! Remote contact endpoints.
//!
//! An endpoint is a store reachable over some transport that answers queries
//! and accepts writes but cannot notify anyone of changes. The polling backend
//! works against any endpoint; the push backend requires the richer
//! [`DocumentCollection`](crate::collections::DocumentCollection).

mod http;

pub use http::{HttpEndpoint, DEFAULT_REQUEST_TIMEOUT};

use crate::error::Result;
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Query and write access to a remote contact set.
#[async_trait]
pub trait ContactsEndpoint: Send + Sync + 'static {
    /// Fetch every record. Order is not guaranteed.
    async fn fetch_all(&self) -> Result<Snapshot>;

    /// Create a record stamped with `now`; the endpoint assigns the id.
    async fn create(&self, data: &ContactFormData, now: DateTime<Utc>) -> Result<ContactId>;

    /// Merge `patch` onto a record. Returns false if the id is unknown.
    async fn update(&self, id: &ContactId, patch: &ContactPatch, now: DateTime<Utc>)
        -> Result<bool>;

    /// Remove a record. Returns false if the id is unknown.
    async fn delete(&self, id: &ContactId) -> Result<bool>;
}
