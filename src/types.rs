//! Core types for the contact directory.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a contact (assigned by the backend).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub String);

impl ContactId {
    /// Fresh random identifier.
    pub fn generate() -> Self {
        ContactId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContactId({})", self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContactId {
    fn from(s: &str) -> Self {
        ContactId(s.to_string())
    }
}

impl From<String> for ContactId {
    fn from(s: String) -> Self {
        ContactId(s)
    }
}

/// A single directory entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Unique identifier (assigned by backend).
    pub id: ContactId,

    pub organization: String,

    pub name: String,

    /// Phone number as entered; see [`crate::links`] for normalization.
    pub whatsapp: String,

    /// Telegram handle, with or without a leading `@`.
    pub telegram_id: String,

    pub is_active: bool,

    pub notes: String,

    /// Set once at creation.
    pub created_at: DateTime<Utc>,

    /// Reset on every successful mutation.
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Build a new record from form data, stamping both timestamps with `now`.
    pub fn create(id: ContactId, data: ContactFormData, now: DateTime<Utc>) -> Self {
        Self {
            id,
            organization: data.organization,
            name: data.name,
            whatsapp: data.whatsapp,
            telegram_id: data.telegram_id,
            is_active: data.is_active,
            notes: data.notes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch onto this record and bump `updated_at`.
    ///
    /// `id` and `created_at` are never touched.
    pub fn apply(&mut self, patch: &ContactPatch, now: DateTime<Utc>) {
        if let Some(ref v) = patch.organization {
            self.organization = v.clone();
        }
        if let Some(ref v) = patch.name {
            self.name = v.clone();
        }
        if let Some(ref v) = patch.whatsapp {
            self.whatsapp = v.clone();
        }
        if let Some(ref v) = patch.telegram_id {
            self.telegram_id = v.clone();
        }
        if let Some(v) = patch.is_active {
            self.is_active = v;
        }
        if let Some(ref v) = patch.notes {
            self.notes = v.clone();
        }
        self.updated_at = touch(self.updated_at, now);
    }

    /// The mutable subset of this record.
    pub fn form_data(&self) -> ContactFormData {
        ContactFormData {
            organization: self.organization.clone(),
            name: self.name.clone(),
            whatsapp: self.whatsapp.clone(),
            telegram_id: self.telegram_id.clone(),
            is_active: self.is_active,
            notes: self.notes.clone(),
        }
    }
}

/// Payload accepted by create operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactFormData {
    pub organization: String,
    pub name: String,
    pub whatsapp: String,
    pub telegram_id: String,
    pub is_active: bool,
    pub notes: String,
}

/// Partial update. `None` fields retain their prior value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        *self == ContactPatch::default()
    }

    pub fn organization(mut self, v: impl Into<String>) -> Self {
        self.organization = Some(v.into());
        self
    }

    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.name = Some(v.into());
        self
    }

    pub fn whatsapp(mut self, v: impl Into<String>) -> Self {
        self.whatsapp = Some(v.into());
        self
    }

    pub fn telegram_id(mut self, v: impl Into<String>) -> Self {
        self.telegram_id = Some(v.into());
        self
    }

    pub fn active(mut self, v: bool) -> Self {
        self.is_active = Some(v);
        self
    }

    pub fn notes(mut self, v: impl Into<String>) -> Self {
        self.notes = Some(v.into());
        self
    }
}

impl From<ContactFormData> for ContactPatch {
    fn from(data: ContactFormData) -> Self {
        Self {
            organization: Some(data.organization),
            name: Some(data.name),
            whatsapp: Some(data.whatsapp),
            telegram_id: Some(data.telegram_id),
            is_active: Some(data.is_active),
            notes: Some(data.notes),
        }
    }
}

/// Complete, ordered set of contacts at one instant.
pub type Snapshot = Vec<Contact>;

/// Order a snapshot newest first.
///
/// The sort is stable, so records sharing a `created_at` keep their
/// relative order.
pub fn sort_newest_first(contacts: &mut [Contact]) {
    contacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Next `updated_at` for a record last stamped at `previous`.
///
/// Never goes backwards and always moves forward by at least a microsecond.
pub fn touch(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}
