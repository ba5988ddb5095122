//! Key-value blob storage for the local-broadcast backend.
//!
//! A blob is an opaque byte string stored under a key. Each single load or
//! save is atomic; nothing makes a load-modify-save cycle atomic, so
//! concurrent writers resolve as last-writer-wins.

mod memory;
mod storage;

pub use memory::MemoryBlobStore;
pub use storage::FileBlobStore;

use crate::error::{DirectoryError, Result};
use crate::types::Contact;
use async_trait::async_trait;

/// Shared, unnotified key-value storage.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Read the blob under `key`, or `None` if nothing was ever stored.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob under `key`.
    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Serialize the full contact array.
pub fn encode_contacts(contacts: &[Contact]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(contacts)?)
}

/// Parse a stored contact array. An absent blob is an empty set.
pub fn decode_contacts(bytes: Option<&[u8]>) -> Result<Vec<Contact>> {
    match bytes {
        None => Ok(Vec::new()),
        Some(b) if b.iter().all(|c| c.is_ascii_whitespace()) => Ok(Vec::new()),
        Some(b) => serde_json::from_slice(b).map_err(|e| {
            DirectoryError::Serialization(format!("corrupt contact blob: {e}"))
        }),
    }
}

/// Keys become file names, so only a conservative character set is allowed.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(DirectoryError::Config(format!("invalid storage key: {key:?}")))
    }
}
