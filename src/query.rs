//! Filtering and summary helpers for list views.

use crate::types::Contact;

/// Which status values pass a filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

/// Filter criteria for a list of contacts.
#[derive(Clone, Debug, Default)]
pub struct ContactFilter {
    /// Case-insensitive substring matched against name, organization and notes.
    pub search: Option<String>,

    pub status: StatusFilter,

    /// Only keep contacts with non-blank notes.
    pub with_notes_only: bool,
}

impl ContactFilter {
    /// Match everything containing `term`.
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes_only(mut self) -> Self {
        self.with_notes_only = true;
        self
    }

    /// Check a single contact.
    pub fn matches(&self, contact: &Contact) -> bool {
        if let Some(ref term) = self.search {
            let term = term.trim().to_lowercase();
            if !term.is_empty() {
                let hit = contact.name.to_lowercase().contains(&term)
                    || contact.organization.to_lowercase().contains(&term)
                    || contact.notes.to_lowercase().contains(&term);
                if !hit {
                    return false;
                }
            }
        }

        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Active => contact.is_active,
            StatusFilter::Inactive => !contact.is_active,
        };
        if !status_ok {
            return false;
        }

        !self.with_notes_only || has_notes(contact)
    }

    /// Keep matching contacts, preserving order.
    pub fn apply<'a>(&self, contacts: &'a [Contact]) -> Vec<&'a Contact> {
        contacts.iter().filter(|c| self.matches(c)).collect()
    }
}

/// Counters shown above the list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub with_notes: usize,
}

impl DirectoryStats {
    pub fn from_contacts(contacts: &[Contact]) -> Self {
        let active = contacts.iter().filter(|c| c.is_active).count();
        Self {
            total: contacts.len(),
            active,
            inactive: contacts.len() - active,
            with_notes: contacts.iter().filter(|c| has_notes(c)).count(),
        }
    }
}

fn has_notes(contact: &Contact) -> bool {
    !contact.notes.trim().is_empty()
}
