//! JSON-over-HTTP endpoint.

use crate::error::{DirectoryError, Result};
use crate::types::{ContactFormData, ContactId, ContactPatch, Snapshot};
use crate::wire::{decode_listing, CreatedBody, NewContactBody};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client as HttpClient, StatusCode};
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::ContactsEndpoint;

/// Applied when no request timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Contacts resource served over HTTP.
///
/// - `GET    {base}/{path}`      list
/// - `POST   {base}/{path}`      create, answers `{"id": ...}`
/// - `PATCH  {base}/{path}/{id}` partial update, 404 when unknown
/// - `DELETE {base}/{path}/{id}` delete, 404 when unknown
#[derive(Clone, Debug)]
pub struct HttpEndpoint {
    http: HttpClient,
    base: Url,
    path: Vec<String>,
}

impl HttpEndpoint {
    /// Endpoint for the `contacts` resource under `base`.
    pub fn new(base: Url) -> Result<Self> {
        Self::with_path(base, &["contacts"], None)
    }

    /// Endpoint for an arbitrary resource path. Requests time out after
    /// `timeout`, or [`DEFAULT_REQUEST_TIMEOUT`] when none is given.
    pub fn with_path(base: Url, path: &[&str], timeout: Option<Duration>) -> Result<Self> {
        if base.cannot_be_a_base() {
            return Err(DirectoryError::Config(format!("not a base URL: {base}")));
        }
        let http = HttpClient::builder()
            .timeout(timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
            .build()?;
        Ok(Self {
            http,
            base,
            path: path.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, id: Option<&ContactId>) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| DirectoryError::Config(format!("not a base URL: {}", self.base)))?;
            segments.pop_if_empty();
            segments.extend(self.path.iter());
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ContactsEndpoint for HttpEndpoint {
    #[instrument(name = "contact_sync.http.fetch_all", skip_all, fields(base = %self.base))]
    async fn fetch_all(&self) -> Result<Snapshot> {
        let url = self.url(None)?;
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(DirectoryError::Transport(format!("HTTP {}", resp.status())));
        }
        let json: serde_json::Value = resp.json().await?;
        decode_listing(json)
    }

    #[instrument(name = "contact_sync.http.create", skip_all, fields(base = %self.base))]
    async fn create(&self, data: &ContactFormData, now: DateTime<Utc>) -> Result<ContactId> {
        let url = self.url(None)?;
        let stamp = now.to_rfc3339();
        let body = NewContactBody {
            data,
            created_at: stamp.clone(),
            updated_at: stamp,
        };
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(DirectoryError::Transport(format!("HTTP {}", resp.status())));
        }
        let created: CreatedBody = resp.json().await?;
        if created.id.is_empty() {
            return Err(DirectoryError::Transport("no id in create response".into()));
        }
        Ok(ContactId(created.id))
    }

    #[instrument(name = "contact_sync.http.update", skip_all, fields(base = %self.base, contact_id = %id))]
    async fn update(
        &self,
        id: &ContactId,
        patch: &ContactPatch,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let url = self.url(Some(id))?;
        let mut body = serde_json::to_value(patch)?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert(
                "updatedAt".to_string(),
                serde_json::Value::String(now.to_rfc3339()),
            );
        }
        let resp = self.http.patch(url).json(&body).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(DirectoryError::Transport(format!("HTTP {s}"))),
        }
    }

    #[instrument(name = "contact_sync.http.delete", skip_all, fields(base = %self.base, contact_id = %id))]
    async fn delete(&self, id: &ContactId) -> Result<bool> {
        let url = self.url(Some(id))?;
        let resp = self.http.delete(url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            s => Err(DirectoryError::Transport(format!("HTTP {s}"))),
        }
    }
}
