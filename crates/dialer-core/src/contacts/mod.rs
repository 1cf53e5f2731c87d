//! # Contacts
//!
//! Contact lists come from outside the dialer (a file, a CRM export, a form
//! post). This module normalises them and owns the per-contact dial ledger
//! the batch dialer claims from.

pub mod pool;

pub use pool::{ClaimedContact, ContactEntry, ContactPool, PoolSnapshot};

use std::collections::HashSet;

use crate::types::PhoneNumber;

/// Anything that can hand the dialer an ordered list of phone numbers
pub trait ContactSource: Send + Sync {
    fn load_contacts(&self) -> Vec<String>;
}

impl ContactSource for Vec<String> {
    fn load_contacts(&self) -> Vec<String> {
        self.clone()
    }
}

/// Normalise a raw phone number to `+<number>`. Blank input yields `None`.
pub fn normalize_phone(raw: &str) -> Option<PhoneNumber> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "+" {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(trimmed.to_string())
    } else {
        Some(format!("+{}", trimmed))
    }
}

/// An ordered, normalised, duplicate-free contact list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactList {
    phones: Vec<PhoneNumber>,
}

impl ContactList {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let phones = raw
            .into_iter()
            .filter_map(|p| normalize_phone(p.as_ref()))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        Self { phones }
    }

    pub fn from_source(source: &dyn ContactSource) -> Self {
        Self::new(source.load_contacts())
    }

    pub fn len(&self) -> usize {
        self.phones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phones.is_empty()
    }

    pub fn phones(&self) -> &[PhoneNumber] {
        &self.phones
    }

    pub fn into_phones(self) -> Vec<PhoneNumber> {
        self.phones
    }
}
