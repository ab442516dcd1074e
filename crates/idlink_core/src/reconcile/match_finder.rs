//! Match lookup for one observation.
//!
//! The match set is ordered oldest first (`created_at`, then `id`); every
//! later tie-break relies on that order.

use crate::model::contact::{Contact, ContactId, Observation};
use crate::repo::contact_repo::{ContactRepository, RepoResult};

/// Active contacts sharing the observed email or phone number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchSet {
    contacts: Vec<Contact>,
}

impl MatchSet {
    /// Builds a match set, enforcing oldest-first order.
    pub fn new(mut contacts: Vec<Contact>) -> Self {
        contacts.sort_by(Contact::cmp_age);
        Self { contacts }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Oldest matched contact.
    pub fn earliest(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    pub fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|contact| contact.id == id)
    }

    /// Matched contacts that are primaries, oldest first.
    pub fn primaries(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().filter(|contact| contact.is_primary())
    }

    /// Distinct group roots of the matched contacts, in match order.
    pub fn root_ids(&self) -> Vec<ContactId> {
        let mut roots = Vec::new();
        for contact in &self.contacts {
            let root = contact.root_id();
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots
    }

    /// Whether some matched contact carries exactly the observed pair.
    pub fn contains_pair(&self, observation: &Observation) -> bool {
        self.contacts
            .iter()
            .any(|contact| contact.has_pair(observation))
    }

    /// Whether the observation carries an email or phone number that no
    /// matched contact has.
    pub fn is_new_information(&self, observation: &Observation) -> bool {
        let new_email = observation.email().is_some_and(|email| {
            !self
                .contacts
                .iter()
                .any(|contact| contact.email.as_deref() == Some(email))
        });
        let new_phone = observation.phone_number().is_some_and(|phone| {
            !self
                .contacts
                .iter()
                .any(|contact| contact.phone_number.as_deref() == Some(phone))
        });
        new_email || new_phone
    }
}

/// Loads every active contact intersecting `observation`.
///
/// # Side effects
/// - None; read-only.
pub fn find_matches<R: ContactRepository>(
    repo: &R,
    observation: &Observation,
) -> RepoResult<MatchSet> {
    let contacts = repo.find_by_email_or_phone(observation.email(), observation.phone_number())?;
    Ok(MatchSet::new(contacts))
}
