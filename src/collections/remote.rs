//! Network document collection: REST for queries and writes, a websocket for
//! pushed changes.

use crate::endpoint::{ContactsEndpoint, HttpEndpoint, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{DirectoryError, Result};
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use crate::wire::{decode_contacts, ChangeFrame};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{ChangeFeed, DocumentCollection, FEED_BUFFER};

/// Silence on the change channel after which the server is pinged. A second
/// silent period closes the channel.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// A collection served by a remote document store.
///
/// Documents live under `{base}/{collection}`; the change channel is a
/// websocket at `{ws_base}/{collection}/listen` whose text frames are
/// `{"documents": [...]}` with the full, server-ordered document set.
///
/// The request timeout also bounds the websocket handshake.
#[derive(Clone, Debug)]
pub struct RemoteCollection {
    endpoint: HttpEndpoint,
    listen_url: Url,
    handshake_timeout: Duration,
    idle_timeout: Duration,
}

impl RemoteCollection {
    pub fn new(
        base: Url,
        ws_base: Url,
        collection: &str,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if collection.is_empty() {
            return Err(DirectoryError::Config("collection name is empty".into()));
        }
        let endpoint = HttpEndpoint::with_path(base, &[collection], timeout)?;

        let mut listen_url = ws_base.clone();
        listen_url
            .path_segments_mut()
            .map_err(|_| DirectoryError::Config(format!("not a base URL: {ws_base}")))?
            .pop_if_empty()
            .extend(&[collection, "listen"]);

        Ok(Self {
            endpoint,
            listen_url,
            handshake_timeout: timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        })
    }

    pub fn with_idle_timeout(mut self, idle: Duration) -> Self {
        self.idle_timeout = idle;
        self
    }

    pub fn listen_url(&self) -> &Url {
        &self.listen_url
    }
}

#[async_trait]
impl ContactsEndpoint for RemoteCollection {
    async fn fetch_all(&self) -> Result<Snapshot> {
        self.endpoint.fetch_all().await
    }

    async fn create(&self, data: &ContactFormData, now: DateTime<Utc>) -> Result<ContactId> {
        self.endpoint.create(data, now).await
    }

    async fn update(
        &self,
        id: &ContactId,
        patch: &ContactPatch,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.endpoint.update(id, patch, now).await
    }

    async fn delete(&self, id: &ContactId) -> Result<bool> {
        self.endpoint.delete(id).await
    }
}

#[async_trait]
impl DocumentCollection for RemoteCollection {
    #[instrument(name = "contact_sync.remote.watch", skip_all, fields(url = %self.listen_url))]
    async fn watch(&self) -> Result<ChangeFeed> {
        let (stream, _) =
            tokio::time::timeout(self.handshake_timeout, connect_async(self.listen_url.as_str()))
                .await
                .map_err(|_| {
                    DirectoryError::Transport(format!(
                        "change channel handshake timed out after {:?}",
                        self.handshake_timeout
                    ))
                })??;
        info!("change channel connected");

        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let url = self.listen_url.clone();
        let idle = self.idle_timeout;
        let reader = tokio::spawn(async move {
            let (mut write, mut read) = stream.split();
            let mut awaiting_pong = false;
            loop {
                let msg = match tokio::time::timeout(idle, read.next()).await {
                    Ok(Some(msg)) => msg,
                    Ok(None) => {
                        info!(url = %url, "change channel ended");
                        break;
                    }
                    Err(_) if awaiting_pong => {
                        warn!(url = %url, "change channel silent after ping, closing");
                        break;
                    }
                    Err(_) => {
                        if let Err(e) = write.send(WsMessage::Ping(Default::default())).await {
                            warn!(url = %url, error = %e, "change channel ping failed");
                            break;
                        }
                        awaiting_pong = true;
                        continue;
                    }
                };
                awaiting_pong = false;

                let text = match msg {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => {
                        info!(url = %url, "change channel closed by server");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(url = %url, error = %e, "change channel receive error");
                        break;
                    }
                };
                let frame: ChangeFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(url = %url, error = %e, "ignoring malformed change frame");
                        continue;
                    }
                };
                if tx.send(decode_contacts(frame.documents)).await.is_err() {
                    debug!(url = %url, "change feed dropped, closing channel");
                    break;
                }
            }
        });

        Ok(ChangeFeed::new(rx, Some(reader.abort_handle())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_url() {
        let col = RemoteCollection::new(
            Url::parse("http://localhost:9000/v1/").unwrap(),
            Url::parse("ws://localhost:9000/v1").unwrap(),
            "contacts",
            None,
        )
        .unwrap();
        assert_eq!(
            col.listen_url().as_str(),
            "ws://localhost:9000/v1/contacts/listen"
        );
    }

    #[test]
    fn test_empty_collection_name_rejected() {
        let err = RemoteCollection::new(
            Url::parse("http://localhost").unwrap(),
            Url::parse("ws://localhost").unwrap(),
            "",
            None,
        );
        assert!(matches!(err, Err(DirectoryError::Config(_))));
    }
}
