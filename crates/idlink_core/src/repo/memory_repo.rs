//! In-memory contact repository.
//!
//! Contacts live in an arena keyed by id; links are plain id references
//! resolved through explicit lookups. Intended for embedded usage and
//! deterministic tests where timestamps must be controlled.
//!
//! # Invariants
//! - Same ordering and soft-delete visibility as the SQLite store.
//! - A failed unit of work leaves the arena exactly as it was before.

use crate::model::contact::{Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact};
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Default)]
struct Arena {
    contacts: BTreeMap<ContactId, Contact>,
    last_id: ContactId,
    last_timestamp: i64,
}

impl Arena {
    fn active(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.values().filter(|contact| contact.is_active())
    }

    fn has_active_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        self.active().any(|contact| {
            contact.email.as_deref() == email && contact.phone_number.as_deref() == phone_number
        })
    }

    /// Wall clock in epoch ms, never moving backwards.
    fn tick(&mut self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0);
        self.last_timestamp = self.last_timestamp.max(now);
        self.last_timestamp
    }
}

/// Mutex-guarded arena implementing `ContactRepository`.
#[derive(Debug, Default)]
pub struct InMemoryContactRepository {
    arena: Mutex<Arena>,
    gate: Mutex<()>,
}

impl InMemoryContactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fully specified contact, keeping its id and timestamps.
    ///
    /// Used for fixtures that need exact `created_at` values.
    pub fn seed(&self, contact: Contact) -> RepoResult<()> {
        contact.validate()?;
        let mut arena = self.lock_arena()?;
        if arena.contacts.contains_key(&contact.id) {
            return Err(RepoError::InvalidData(format!(
                "contact id {} already exists",
                contact.id
            )));
        }
        if contact.is_active()
            && arena.has_active_pair(contact.email.as_deref(), contact.phone_number.as_deref())
        {
            return Err(RepoError::DuplicatePair);
        }
        arena.last_id = arena.last_id.max(contact.id);
        arena.last_timestamp = arena.last_timestamp.max(contact.created_at);
        arena.contacts.insert(contact.id, contact);
        Ok(())
    }

    /// Returns every stored contact, including soft-deleted ones, by id.
    pub fn snapshot(&self) -> RepoResult<Vec<Contact>> {
        Ok(self.lock_arena()?.contacts.values().cloned().collect())
    }

    fn lock_arena(&self) -> RepoResult<MutexGuard<'_, Arena>> {
        self.arena
            .lock()
            .map_err(|_| RepoError::Unavailable("poisoned lock: contact arena".to_string()))
    }
}

impl ContactRepository for InMemoryContactRepository {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> RepoResult<Vec<Contact>> {
        let arena = self.lock_arena()?;
        let mut matches: Vec<Contact> = arena
            .active()
            .filter(|contact| {
                (email.is_some() && contact.email.as_deref() == email)
                    || (phone_number.is_some() && contact.phone_number.as_deref() == phone_number)
            })
            .cloned()
            .collect();
        matches.sort_by(Contact::cmp_age);
        Ok(matches)
    }

    fn get_contact(&self, id: ContactId) -> RepoResult<Option<Contact>> {
        let arena = self.lock_arena()?;
        Ok(arena
            .contacts
            .get(&id)
            .filter(|contact| contact.is_active())
            .cloned())
    }

    fn insert(&self, contact: &NewContact) -> RepoResult<Contact> {
        contact.validate()?;
        let mut arena = self.lock_arena()?;
        if arena.has_active_pair(contact.email.as_deref(), contact.phone_number.as_deref()) {
            return Err(RepoError::DuplicatePair);
        }
        if let Some(linked_id) = contact.linked_id {
            if !arena.contacts.contains_key(&linked_id) {
                return Err(RepoError::NotFound(linked_id));
            }
        }

        let now = arena.tick();
        arena.last_id += 1;
        let stored = Contact {
            id: arena.last_id,
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            linked_id: contact.linked_id,
            link_precedence: contact.link_precedence,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        arena.contacts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn demote_to_secondary(&self, id: ContactId, new_linked_id: ContactId) -> RepoResult<()> {
        if id == new_linked_id {
            return Err(ContactValidationError::SelfLink(id).into());
        }
        let mut arena = self.lock_arena()?;
        if !arena.contacts.contains_key(&new_linked_id) {
            return Err(RepoError::NotFound(new_linked_id));
        }
        let now = arena.tick();
        let contact = arena
            .contacts
            .get_mut(&id)
            .filter(|contact| contact.is_active())
            .ok_or(RepoError::NotFound(id))?;

        match (contact.link_precedence, contact.linked_id) {
            (LinkPrecedence::Primary, _) => {}
            (LinkPrecedence::Secondary, Some(linked_id)) if linked_id == new_linked_id => {}
            (LinkPrecedence::Secondary, linked_id) => {
                return Err(RepoError::AlreadySecondary {
                    id,
                    linked_id: linked_id.unwrap_or(id),
                });
            }
        }

        contact.link_precedence = LinkPrecedence::Secondary;
        contact.linked_id = Some(new_linked_id);
        contact.updated_at = now;
        Ok(())
    }

    fn reparent(&self, old_linked_id: ContactId, new_linked_id: ContactId) -> RepoResult<usize> {
        let mut arena = self.lock_arena()?;
        let now = arena.tick();
        let mut moved = 0;
        for contact in arena.contacts.values_mut() {
            if contact.is_active()
                && contact.linked_id == Some(old_linked_id)
                && contact.id != new_linked_id
            {
                contact.linked_id = Some(new_linked_id);
                contact.updated_at = now;
                moved += 1;
            }
        }
        Ok(moved)
    }

    fn find_group(&self, primary_id: ContactId) -> RepoResult<Vec<Contact>> {
        let arena = self.lock_arena()?;
        let mut group: Vec<Contact> = arena
            .active()
            .filter(|contact| contact.id == primary_id || contact.linked_id == Some(primary_id))
            .cloned()
            .collect();
        group.sort_by(Contact::cmp_age);
        Ok(group)
    }

    fn unit_of_work<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<RepoError>,
    {
        let _gate = self
            .gate
            .lock()
            .map_err(|_| RepoError::Unavailable("poisoned lock: unit of work gate".to_string()))?;
        let snapshot = self.lock_arena()?.clone();

        match work(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self.lock_arena()? = snapshot;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryContactRepository;
    use crate::model::contact::{Contact, LinkPrecedence, NewContact, Observation};
    use crate::repo::contact_repo::{ContactRepository, RepoError};

    fn primary(id: i64, email: Option<&str>, phone: Option<&str>, created_at: i64) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn insert_assigns_increasing_ids_after_seeded_rows() {
        let repo = InMemoryContactRepository::new();
        repo.seed(primary(10, Some("a@x.com"), None, 100)).unwrap();

        let observation = Observation::new(Some("b@x.com"), None).unwrap();
        let created = repo.insert(&NewContact::primary(&observation)).unwrap();
        assert_eq!(created.id, 11);
        assert!(created.created_at >= 100);
    }

    #[test]
    fn insert_rejects_duplicate_active_pair() {
        let repo = InMemoryContactRepository::new();
        repo.seed(primary(1, Some("a@x.com"), Some("111"), 100)).unwrap();

        let observation = Observation::new(Some("a@x.com"), Some("111")).unwrap();
        let err = repo.insert(&NewContact::primary(&observation)).unwrap_err();
        assert!(matches!(err, RepoError::DuplicatePair));
    }

    #[test]
    fn lookups_skip_soft_deleted_rows() {
        let repo = InMemoryContactRepository::new();
        let mut deleted = primary(1, Some("a@x.com"), None, 100);
        deleted.deleted_at = Some(150);
        repo.seed(deleted).unwrap();
        repo.seed(primary(2, Some("a@x.com"), None, 200)).unwrap();

        let found = repo.find_by_email_or_phone(Some("a@x.com"), None).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);
        assert!(repo.get_contact(1).unwrap().is_none());
    }

    #[test]
    fn demote_refuses_secondary_of_other_primary() {
        let repo = InMemoryContactRepository::new();
        repo.seed(primary(1, Some("a@x.com"), None, 100)).unwrap();
        repo.seed(primary(2, Some("b@x.com"), None, 200)).unwrap();
        repo.seed(primary(3, Some("c@x.com"), None, 300)).unwrap();

        repo.demote_to_secondary(3, 1).unwrap();
        repo.demote_to_secondary(3, 1).unwrap();
        let err = repo.demote_to_secondary(3, 2).unwrap_err();
        assert!(matches!(
            err,
            RepoError::AlreadySecondary { id: 3, linked_id: 1 }
        ));
    }

    #[test]
    fn failed_unit_of_work_restores_arena() {
        let repo = InMemoryContactRepository::new();
        repo.seed(primary(1, Some("a@x.com"), None, 100)).unwrap();

        let result: Result<(), RepoError> = repo.unit_of_work(|repo| {
            let observation = Observation::new(Some("b@x.com"), None).unwrap();
            repo.insert(&NewContact::primary(&observation))?;
            repo.demote_to_secondary(1, 99)?;
            Err(RepoError::NotFound(99))
        });

        assert!(result.is_err());
        let contacts = repo.snapshot().unwrap();
        assert_eq!(contacts.len(), 1);
        assert!(contacts[0].is_primary());
    }
}
