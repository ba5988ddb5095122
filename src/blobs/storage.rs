//! File-backed blob storage.

use crate::error::{DirectoryError, Result};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

use super::{validate_key, BlobStore};

/// One file per key inside a directory.
///
/// Readers take a shared lock and writers an exclusive lock on a sidecar
/// `<key>.lock` file, so a reader never sees a half-written blob. Writes go to
/// a temporary file that is renamed into place.
#[derive(Clone, Debug)]
pub struct FileBlobStore {
    /// Base directory for blobs.
    path: PathBuf,
}

impl FileBlobStore {
    /// Create a new blob storage at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of the blob stored under `key`.
    pub fn blob_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{key}.json"))
    }

    fn lock_path(&self, key: &str) -> PathBuf {
        self.path.join(format!("{key}.lock"))
    }

    fn open_lock(&self, key: &str) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.lock_path(key))?)
    }

    fn load_blocking(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let lock = self.open_lock(key)?;
        lock.lock_shared()?;

        let result = match File::open(self.blob_path(key)) {
            Ok(mut file) => {
                let mut content = Vec::new();
                file.read_to_end(&mut content)?;
                Ok(Some(content))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        };

        lock.unlock()?;
        result
    }

    fn save_blocking(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let lock = self.open_lock(key)?;
        lock.lock_exclusive()?;

        let tmp_path = self.path.join(format!("{key}.json.tmp"));
        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, self.blob_path(key))?;
            Ok(())
        })();

        lock.unlock()?;
        trace!(key, bytes = bytes.len(), "blob saved");
        result
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.load_blocking(&key))
            .await
            .map_err(|e| DirectoryError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }

    async fn save(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.save_blocking(&key, &bytes))
            .await
            .map_err(|e| DirectoryError::Io(std::io::Error::new(ErrorKind::Other, e)))?
    }
}
