//! Consumer-side glue: a backend-agnostic client, a blocking snapshot
//! receiver, and the explicit view state a list screen renders from.

use crate::error::Result;
use crate::query::{ContactFilter, DirectoryStats};
use crate::repository::ContactRepository;
use crate::subscriptions::{SnapshotCallback, Subscription};
use crate::types::{Contact, ContactFormData, ContactId, ContactPatch, Snapshot};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Same five operations for every backend.
#[derive(Clone)]
pub struct DirectoryClient {
    repo: Arc<dyn ContactRepository>,
}

impl DirectoryClient {
    pub fn new(repo: Arc<dyn ContactRepository>) -> Self {
        Self { repo }
    }

    pub fn backend_name(&self) -> &'static str {
        self.repo.backend_name()
    }

    pub async fn get_all_contacts(&self) -> Snapshot {
        self.repo.get_all_contacts().await
    }

    pub fn subscribe_to_contacts(&self, callback: SnapshotCallback) -> Subscription {
        self.repo.subscribe_to_contacts(callback)
    }

    pub async fn add_contact(&self, data: ContactFormData) -> Result<ContactId> {
        self.repo.add_contact(data).await
    }

    pub async fn update_contact(&self, id: &ContactId, patch: ContactPatch) -> Result<()> {
        self.repo.update_contact(id, patch).await
    }

    pub async fn delete_contact(&self, id: &ContactId) -> Result<()> {
        self.repo.delete_contact(id).await
    }

    /// Subscribe and receive snapshots on a channel.
    ///
    /// The subscription lives as long as the returned receiver.
    pub fn watch(&self) -> SnapshotReceiver {
        let (tx, rx) = crossbeam_channel::unbounded();
        let subscription = self.repo.subscribe_to_contacts(Arc::new(move |snapshot| {
            // Receiver gone; the drop below is already unsubscribing.
            let _ = tx.send(snapshot);
        }));
        debug!(subscription_id = %subscription.id(), backend = self.backend_name(), "watch started");
        SnapshotReceiver { rx, subscription }
    }
}

/// Snapshots from one subscription. Unsubscribes on drop.
pub struct SnapshotReceiver {
    rx: Receiver<Snapshot>,
    subscription: Subscription,
}

impl SnapshotReceiver {
    /// Block until the next snapshot. `None` once the subscription is gone.
    pub fn recv(&self) -> Option<Snapshot> {
        self.rx.recv().ok()
    }

    /// Next snapshot if one is already queued.
    pub fn try_recv(&self) -> Option<Snapshot> {
        match self.rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Snapshot> {
        match self.rx.recv_timeout(timeout) {
            Ok(s) => Some(s),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain the queue and keep only the newest snapshot.
    pub fn latest(&self) -> Option<Snapshot> {
        self.rx.try_iter().last()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl Drop for SnapshotReceiver {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

/// Screen the UI is showing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    /// Read-only directory listing.
    #[default]
    Public,
    /// Submission form.
    Submit,
    /// Management dashboard; a sign-in prompt until the session is admin.
    Admin,
}

/// What the UI renders from: the latest snapshot plus session flags.
#[derive(Clone, Debug)]
pub struct ViewState {
    pub contacts: Snapshot,

    /// True until the first snapshot arrives.
    pub loading: bool,

    pub current_view: View,

    /// Set once the access-code check has passed for this session.
    pub is_admin: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            contacts: Vec::new(),
            loading: true,
            current_view: View::Public,
            is_admin: false,
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list wholesale.
    pub fn apply(&mut self, snapshot: Snapshot) {
        self.contacts = snapshot;
        self.loading = false;
    }

    /// Switch screens. Session flags are left alone.
    pub fn show(&mut self, view: View) {
        self.current_view = view;
    }

    /// Mark the session as admin and open the dashboard.
    pub fn enter_admin(&mut self) {
        self.is_admin = true;
        self.current_view = View::Admin;
    }

    /// Drop admin rights and return to the listing.
    pub fn leave_admin(&mut self) {
        self.is_admin = false;
        self.current_view = View::Public;
    }

    /// The admin screen was asked for but the session is not admin yet.
    pub fn needs_sign_in(&self) -> bool {
        self.current_view == View::Admin && !self.is_admin
    }

    pub fn visible(&self, filter: &ContactFilter) -> Vec<&Contact> {
        filter.apply(&self.contacts)
    }

    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats::from_contacts(&self.contacts)
    }

    pub fn find(&self, id: &ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| &c.id == id)
    }
}
