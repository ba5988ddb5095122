//! Change signals for stores that cannot notify on their own.
//!
//! A write to the shared blob is announced twice: on an in-process bus for
//! subscribers in the writer's own context, and on a [`SignalChannel`] for
//! every other context observing the same key. A context ignores its own
//! signals on the cross-context channel.

mod file;
mod hub;

pub use file::FileSignalChannel;
pub use hub::BroadcastHub;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Identity of one execution context sharing a blob.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    pub fn generate() -> Self {
        ContextId(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextId({})", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// "The blob under `key` was rewritten by `origin`."
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSignal {
    pub origin: ContextId,
    pub key: String,
    /// Per-origin counter; makes repeated signals distinguishable.
    pub seq: u64,
}

/// Cross-context notification primitive.
#[async_trait]
pub trait SignalChannel: Send + Sync + 'static {
    /// Announce a change to every listener, including the sender's own.
    async fn post(&self, signal: ChangeSignal) -> Result<()>;

    /// Start receiving signals posted after this call.
    ///
    /// Must be called from within a Tokio runtime.
    fn listen(&self) -> broadcast::Receiver<ChangeSignal>;
}
