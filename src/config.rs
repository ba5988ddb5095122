//! Directory configuration and backend selection.
//!
//! The backend is chosen once, from configuration, and held for the life of
//! the process. Connection parameters are passed through as given; the only
//! validation is that required values are present.
//!
//! ```toml
//! [backend]
//! kind = "polling"
//! base_url = "https://example.org/api"
//! interval_ms = 5000
//!
//! [access]
//! admin = "change-me"
//! ```

use crate::backends::{LocalRepository, PollingRepository, PushRepository};
use crate::blobs::FileBlobStore;
use crate::collections::RemoteCollection;
use crate::endpoint::{HttpEndpoint, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{DirectoryError, Result};
use crate::repository::ContactRepository;
use crate::signals::{ContextId, FileSignalChannel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub backend: BackendConfig,

    /// Passed through to the UI gate untouched.
    #[serde(default)]
    pub access: AccessCodes,
}

/// Which backend to run, with its connection parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Push(PushConfig),
    Local(LocalConfig),
    Polling(PollingConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local(LocalConfig::default())
    }
}

/// Remote document collection with a push channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushConfig {
    /// REST base, e.g. `https://db.example.org/v1`.
    pub base_url: String,

    /// Websocket base, e.g. `wss://db.example.org/v1`.
    pub ws_url: String,

    #[serde(default = "default_key")]
    pub collection: String,

    /// Wait before reopening a dropped change channel.
    /// Default: 2000
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_delay_ms: u64,

    /// Bounds each HTTP request, and for push also the change channel
    /// handshake and the wait for its first event.
    /// Default: 10000
    /// Default: 10000
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// Shared blob on the local filesystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding the blob and its signal file.
    pub dir: PathBuf,

    #[serde(default = "default_key")]
    pub key: String,

    /// How often other contexts' signals are picked up.
    /// Default: 250
    #[serde(default = "default_signal_poll_ms")]
    pub signal_poll_ms: u64,

    /// Fixed context id; generated when absent.
    #[serde(default)]
    pub context: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./contacts"),
            key: default_key(),
            signal_poll_ms: default_signal_poll_ms(),
            context: None,
        }
    }
}

/// HTTP endpoint without push.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollingConfig {
    pub base_url: String,

    /// Default: 5000
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Refetch for live subscriptions right after each successful write.
    #[serde(default)]
    pub refetch_after_write: bool,

    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// Access codes for the UI gate. Opaque to the core.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AccessCodes {
    #[serde(default)]
    pub admin: String,
    #[serde(default)]
    pub user: String,
}

impl std::fmt::Debug for AccessCodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCodes")
            .field("admin", &"<redacted>")
            .field("user", &"<redacted>")
            .finish()
    }
}

fn default_key() -> String {
    "contacts".to_string()
}

fn default_reconnect_ms() -> u64 {
    2000
}

fn default_signal_poll_ms() -> u64 {
    250
}

fn default_interval_ms() -> u64 {
    5000
}

fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(DirectoryError::Config(format!("{name} is required")))
    } else {
        Ok(())
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url> {
    require(name, value)?;
    Url::parse(value).map_err(|e| DirectoryError::Config(format!("{name}: {e}")))
}

impl DirectoryConfig {
    /// Parse from TOML text and check required values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DirectoryConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Presence checks only; values are otherwise taken as given.
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendConfig::Push(c) => {
                require("backend.base_url", &c.base_url)?;
                require("backend.ws_url", &c.ws_url)?;
                require("backend.collection", &c.collection)?;
            }
            BackendConfig::Local(c) => {
                require("backend.dir", &c.dir.to_string_lossy())?;
                require("backend.key", &c.key)?;
                if c.signal_poll_ms == 0 {
                    return Err(DirectoryError::Config("backend.signal_poll_ms must be > 0".into()));
                }
            }
            BackendConfig::Polling(c) => {
                require("backend.base_url", &c.base_url)?;
                if c.interval_ms == 0 {
                    return Err(DirectoryError::Config("backend.interval_ms must be > 0".into()));
                }
            }
        }
        Ok(())
    }
}

/// Build the configured backend.
///
/// Must be called from within a Tokio runtime.
pub fn open_repository(config: &DirectoryConfig) -> Result<Arc<dyn ContactRepository>> {
    config.validate()?;
    let repo: Arc<dyn ContactRepository> = match &config.backend {
        BackendConfig::Push(c) => {
            let timeout = c
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT);
            let collection = RemoteCollection::new(
                parse_url("backend.base_url", &c.base_url)?,
                parse_url("backend.ws_url", &c.ws_url)?,
                &c.collection,
                Some(timeout),
            )?;
            Arc::new(
                PushRepository::new(collection)?
                    .with_reconnect_delay(Duration::from_millis(c.reconnect_delay_ms))
                    .with_open_timeout(timeout),
            )
        }
        BackendConfig::Local(c) => {
            let blobs = Arc::new(FileBlobStore::new(&c.dir)?);
            let signals = Arc::new(FileSignalChannel::new(
                &c.dir,
                &c.key,
                Duration::from_millis(c.signal_poll_ms),
            )?);
            let context = c
                .context
                .clone()
                .map(ContextId)
                .unwrap_or_else(ContextId::generate);
            Arc::new(LocalRepository::with_context(
                blobs,
                signals,
                c.key.clone(),
                context,
            )?)
        }
        BackendConfig::Polling(c) => {
            let endpoint = HttpEndpoint::with_path(
                parse_url("backend.base_url", &c.base_url)?,
                &["contacts"],
                c.request_timeout_ms.map(Duration::from_millis),
            )?;
            Arc::new(
                PollingRepository::new(endpoint, Duration::from_millis(c.interval_ms))?
                    .with_refetch_after_write(c.refetch_after_write),
            )
        }
    };
    info!(backend = repo.backend_name(), "contact repository opened");
    Ok(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_polling_with_defaults() {
        let config = DirectoryConfig::from_toml_str(
            r#"
            [backend]
            kind = "polling"
            base_url = "http://localhost:3000/api"

            [access]
            admin = "admin123"
            "#,
        )
        .unwrap();

        match config.backend {
            BackendConfig::Polling(ref c) => {
                assert_eq!(c.interval_ms, 5000);
                assert!(!c.refetch_after_write);
            }
            ref other => panic!("Expected polling backend, got {:?}", other),
        }
        assert_eq!(config.access.admin, "admin123");
        assert!(!format!("{:?}", config.access).contains("admin123"));
    }

    #[test]
    fn test_parse_push() {
        let config = DirectoryConfig::from_toml_str(
            r#"
            [backend]
            kind = "push"
            base_url = "http://localhost:9000"
            ws_url = "ws://localhost:9000"
            "#,
        )
        .unwrap();
        match config.backend {
            BackendConfig::Push(ref c) => {
                assert_eq!(c.collection, "contacts");
                assert_eq!(c.reconnect_delay_ms, 2000);
            }
            ref other => panic!("Expected push backend, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_values_rejected() {
        let err = DirectoryConfig::from_toml_str(
            r#"
            [backend]
            kind = "polling"
            base_url = "  "
            "#,
        );
        assert!(matches!(err, Err(DirectoryError::Config(_))));

        let err = DirectoryConfig::from_toml_str("[backend]\nkind = \"carrier-pigeon\"\n");
        assert!(matches!(err, Err(DirectoryError::Config(_))));
    }

    #[tokio::test]
    async fn test_open_local_from_config() {
        let dir = TempDir::new().unwrap();
        let config = DirectoryConfig {
            backend: BackendConfig::Local(LocalConfig {
                dir: dir.path().to_path_buf(),
                context: Some("tab-1".into()),
                ..Default::default()
            }),
            access: AccessCodes::default(),
        };
        let repo = open_repository(&config).unwrap();
        assert_eq!(repo.backend_name(), "local");
        assert!(repo.get_all_contacts().await.is_empty());
    }

    #[tokio::test]
    async fn test_open_polling_rejects_bad_url() {
        let config = DirectoryConfig {
            backend: BackendConfig::Polling(PollingConfig {
                base_url: "not a url".into(),
                interval_ms: 1000,
                refetch_after_write: false,
                request_timeout_ms: None,
            }),
            access: AccessCodes::default(),
        };
        assert!(matches!(
            open_repository(&config),
            Err(DirectoryError::Config(_))
        ));
    }
}
