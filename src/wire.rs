//! JSON wire shape shared by the remote backends.
//!
//! Remote stores hand back one JSON object per contact with camelCase field
//! names and string timestamps. Parsing is lenient: absent text fields become
//! empty, an absent flag is `false`, and an absent or malformed timestamp is
//! replaced with the current time.

use crate::types::{Contact, ContactFormData, ContactId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A contact as sent over the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireContact {
    pub id: String,
    pub organization: String,
    pub name: String,
    pub whatsapp: String,
    pub telegram_id: String,
    pub is_active: bool,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl WireContact {
    /// Convert into a domain record. Records without an id are rejected.
    pub fn into_contact(self, now: DateTime<Utc>) -> Option<Contact> {
        if self.id.is_empty() {
            warn!("dropping wire record without id");
            return None;
        }
        let created_at = parse_timestamp(self.created_at.as_deref(), now, &self.id);
        let updated_at = parse_timestamp(self.updated_at.as_deref(), now, &self.id);
        Some(Contact {
            id: ContactId(self.id),
            organization: self.organization,
            name: self.name,
            whatsapp: self.whatsapp,
            telegram_id: self.telegram_id,
            is_active: self.is_active,
            notes: self.notes,
            created_at,
            updated_at,
        })
    }
}

impl From<&Contact> for WireContact {
    fn from(c: &Contact) -> Self {
        Self {
            id: c.id.0.clone(),
            organization: c.organization.clone(),
            name: c.name.clone(),
            whatsapp: c.whatsapp.clone(),
            telegram_id: c.telegram_id.clone(),
            is_active: c.is_active,
            notes: c.notes.clone(),
            created_at: Some(c.created_at.to_rfc3339()),
            updated_at: Some(c.updated_at.to_rfc3339()),
        }
    }
}

/// Body of a create request: form fields plus client-side timestamps.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContactBody<'a> {
    #[serde(flatten)]
    pub data: &'a ContactFormData,
    pub created_at: String,
    pub updated_at: String,
}

/// Response of a create request.
#[derive(Clone, Debug, Deserialize)]
pub struct CreatedBody {
    pub id: String,
}

/// Frame pushed on a collection's change channel.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeFrame {
    pub documents: Vec<WireContact>,
}

/// Convert a batch of wire records, dropping the unusable ones.
pub fn decode_contacts(records: Vec<WireContact>) -> Vec<Contact> {
    let now = Utc::now();
    records
        .into_iter()
        .filter_map(|r| r.into_contact(now))
        .collect()
}

/// Accepts a bare array or an object wrapping it under `data`, `contacts`
/// or `documents`. Any other object (an error body, say) is a read failure.
pub fn decode_listing(json: serde_json::Value) -> crate::error::Result<Vec<Contact>> {
    let items = match json {
        serde_json::Value::Array(items) => serde_json::Value::Array(items),
        serde_json::Value::Object(mut map) => map
            .remove("data")
            .or_else(|| map.remove("contacts"))
            .or_else(|| map.remove("documents"))
            .ok_or_else(|| {
                let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                crate::error::DirectoryError::ReadFailure(format!(
                    "listing object has no contact array (keys: {keys:?})"
                ))
            })?,
        other => {
            return Err(crate::error::DirectoryError::ReadFailure(format!(
                "unexpected listing shape: {other}"
            )))
        }
    };
    let records: Vec<WireContact> = serde_json::from_value(items)?;
    Ok(decode_contacts(records))
}

fn parse_timestamp(raw: Option<&str>, fallback: DateTime<Utc>, id: &str) -> DateTime<Utc> {
    match raw {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!(contact_id = %id, raw = %s, error = %e, "unparsable timestamp, using now");
                fallback
            }
        },
        None => fallback,
    }
}
