//! Subscription system for live directory updates.
//!
//! Every subscription owns one delivery task. The task pulls snapshots from a
//! backend-specific [`SnapshotFeed`] and hands them, sorted newest first, to
//! the subscriber's callback:
//! - the first snapshot is always delivered, even if it is empty
//! - unsubscribing is immediate, idempotent and allowed from the callback
//! - cancelling a subscription aborts its task, dropping the timers and
//!   listeners the feed holds
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new()?;
//! let sub = manager.subscribe(feed, Arc::new(|contacts| {
//!     println!("{} contacts", contacts.len());
//! }));
//! // later
//! sub.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{SnapshotCallback, SnapshotFeed, Subscription, SubscriptionId};
