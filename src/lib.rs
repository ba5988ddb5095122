//! # Contact Sync
//!
//! A small contact directory whose records live in one of several storage
//! substrates and stay synchronized across concurrent viewers.
//!
//! ## Core Concepts
//!
//! - **Repository**: one contract (`get_all_contacts`, `subscribe_to_contacts`,
//!   `add_contact`, `update_contact`, `delete_contact`) with three backends
//! - **Push**: a remote document collection that pushes every change
//! - **Local**: a JSON blob under one key plus a change signal between contexts
//! - **Polling**: an HTTP endpoint re-read on a fixed interval
//! - **Snapshots**: every read and every delivery is the full set, newest first
//!
//! ## Example
//!
//! ```ignore
//! use contact_sync::{open_repository, ContactFormData, DirectoryClient, DirectoryConfig};
//!
//! let config = DirectoryConfig::load("directory.toml")?;
//! let client = DirectoryClient::new(open_repository(&config)?);
//!
//! let id = client.add_contact(ContactFormData {
//!     organization: "Acme".into(),
//!     name: "Jane".into(),
//!     is_active: true,
//!     ..Default::default()
//! }).await?;
//!
//! let updates = client.watch();
//! while let Some(snapshot) = updates.recv() {
//!     println!("{} contacts", snapshot.len());
//! }
//! ```

pub mod adapter;
pub mod backends;
pub mod blobs;
pub mod collections;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod links;
pub mod query;
pub mod repository;
pub mod signals;
pub mod subscriptions;
pub mod types;
pub mod wire;

// Re-exports
pub use adapter::{DirectoryClient, SnapshotReceiver, View, ViewState};
pub use backends::{LocalRepository, PollingRepository, PushRepository};
pub use blobs::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use collections::{ChangeFeed, DocumentCollection, MemoryCollection, RemoteCollection};
pub use config::{
    open_repository, AccessCodes, BackendConfig, DirectoryConfig, LocalConfig, PollingConfig,
    PushConfig,
};
pub use endpoint::{ContactsEndpoint, HttpEndpoint, DEFAULT_REQUEST_TIMEOUT};
pub use error::{DirectoryError, Result};
pub use links::{format_phone_number, telegram_link, whatsapp_link};
pub use query::{ContactFilter, DirectoryStats, StatusFilter};
pub use repository::ContactRepository;
pub use signals::{BroadcastHub, ChangeSignal, ContextId, FileSignalChannel, SignalChannel};
pub use subscriptions::{
    SnapshotCallback, SnapshotFeed, Subscription, SubscriptionId, SubscriptionManager,
};
pub use types::{Contact, ContactFormData, ContactId, ContactPatch, Snapshot};
