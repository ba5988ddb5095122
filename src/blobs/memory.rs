//! In-memory blob storage.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::BlobStore;

/// Blob map shared by every clone, like one origin's local storage shared by
/// all of its tabs.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a blob directly, bypassing any repository.
    pub fn put_raw(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.blobs.lock().insert(key.to_string(), bytes.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), bytes);
        Ok(())
    }
}
