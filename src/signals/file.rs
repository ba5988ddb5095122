//! Cross-process channel over a polled sidecar file.

use crate::error::{DirectoryError, Result};
use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{ChangeSignal, SignalChannel};

/// Signals written to `<dir>/<key>.signal` and picked up by polling.
///
/// Every process pointing at the same directory and key sees the others'
/// signals within one poll interval, the sender's own listeners included.
/// The poller runs only while someone listens.
///
/// Writers serialize on `<key>.signal.lock` and stage each signal in its own
/// temp file, so the signal file is always replaced whole.
pub struct FileSignalChannel {
    path: PathBuf,
    lock_path: PathBuf,
    poll_interval: Duration,
    tx: broadcast::Sender<ChangeSignal>,
    /// Running poller. Cleared by the poller itself, under this lock, when it
    /// stops for lack of listeners.
    poller: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FileSignalChannel {
    pub fn new(dir: impl AsRef<Path>, key: &str, poll_interval: Duration) -> Result<Self> {
        crate::blobs::validate_key(key)?;
        if poll_interval.is_zero() {
            return Err(DirectoryError::Config("signal poll interval is zero".into()));
        }
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let (tx, _) = broadcast::channel(64);
        Ok(Self {
            path: dir.join(format!("{key}.signal")),
            lock_path: dir.join(format!("{key}.signal.lock")),
            poll_interval,
            tx,
            poller: Arc::new(Mutex::new(None)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a poller is currently watching the signal file.
    pub fn is_polling(&self) -> bool {
        self.poller.lock().is_some()
    }

    fn write_blocking(path: &Path, lock_path: &Path, bytes: &[u8]) -> Result<()> {
        let lock = OpenOptions::new().create(true).write(true).open(lock_path)?;
        lock.lock_exclusive()?;

        let tmp_path = path.with_extension(format!("signal.{}.tmp", Uuid::new_v4().simple()));
        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }

        lock.unlock()?;
        result
    }

    fn read_signal(path: &Path) -> Option<ChangeSignal> {
        match fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    trace!(error = %e, "unreadable signal file");
                    None
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                trace!(error = %e, "signal file read failed");
                None
            }
        }
    }

    fn spawn_poller(&self) -> JoinHandle<()> {
        let path = self.path.clone();
        let tx = self.tx.clone();
        let slot = Arc::clone(&self.poller);
        let every = self.poll_interval;
        tokio::spawn(async move {
            let mut last = Self::read_signal(&path);
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if tx.receiver_count() == 0 {
                    // listen() subscribes under the same lock, so a listener
                    // either shows up here or finds the slot empty.
                    let mut slot = slot.lock();
                    if tx.receiver_count() == 0 {
                        *slot = None;
                        debug!(path = %path.display(), "no signal listeners left, stopping poller");
                        return;
                    }
                }
                let current = Self::read_signal(&path);
                if current.is_some() && current != last {
                    if let Some(ref signal) = current {
                        let _ = tx.send(signal.clone());
                    }
                    last = current;
                }
            }
        })
    }
}

#[async_trait]
impl SignalChannel for FileSignalChannel {
    async fn post(&self, signal: ChangeSignal) -> Result<()> {
        let bytes = serde_json::to_vec(&signal)?;
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();
        tokio::task::spawn_blocking(move || Self::write_blocking(&path, &lock_path, &bytes))
            .await
            .map_err(|e| DirectoryError::Io(std::io::Error::new(ErrorKind::Other, e)))??;

        trace!(origin = %signal.origin, seq = signal.seq, "signal written");
        Ok(())
    }

    fn listen(&self) -> broadcast::Receiver<ChangeSignal> {
        let mut poller = self.poller.lock();
        let rx = self.tx.subscribe();
        if poller.is_none() {
            *poller = Some(self.spawn_poller());
        }
        rx
    }
}

impl Drop for FileSignalChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }
}
