//! Creation decision for one observation.
//!
//! # Invariants
//! - No contact is created when a matched contact already carries the
//!   exact observed pair.
//! - A new secondary always links to a primary id: the reference contact
//!   is resolved one level through `linked_id`.

use crate::model::contact::{Contact, ContactId, NewContact, Observation};
use crate::reconcile::match_finder::MatchSet;
use crate::repo::contact_repo::{ContactRepository, RepoError, RepoResult};
use log::debug;

/// What the observation requires from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDecision {
    /// Nothing matched; the observation starts a new identity.
    CreatePrimary,
    /// The observation adds an email or phone to a known identity.
    CreateSecondary { linked_id: ContactId },
    /// A matched contact carries exactly the observed pair.
    ExactDuplicate,
    /// Every observed value is already known to the match set.
    NothingNew,
}

impl LinkDecision {
    /// Stable label used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatePrimary => "create_primary",
            Self::CreateSecondary { .. } => "create_secondary",
            Self::ExactDuplicate => "exact_duplicate",
            Self::NothingNew => "nothing_new",
        }
    }
}

/// Decides the creation action for `observation` given its match set.
pub fn decide(matches: &MatchSet, observation: &Observation) -> LinkDecision {
    if matches.is_empty() {
        return LinkDecision::CreatePrimary;
    }
    if matches.contains_pair(observation) {
        return LinkDecision::ExactDuplicate;
    }
    if !matches.is_new_information(observation) {
        return LinkDecision::NothingNew;
    }

    match link_target(matches) {
        Some(linked_id) => LinkDecision::CreateSecondary { linked_id },
        None => LinkDecision::CreatePrimary,
    }
}

/// Primary id a new secondary should link to.
///
/// The reference contact is the only matched primary when there is
/// exactly one, otherwise the oldest matched contact.
pub fn link_target(matches: &MatchSet) -> Option<ContactId> {
    let mut primaries = matches.primaries();
    let reference = match (primaries.next(), primaries.next()) {
        (Some(only), None) => only,
        _ => matches.earliest()?,
    };
    Some(reference.root_id())
}

/// Persists the contact required by `decision`, if any.
///
/// Returns `None` when nothing was created. A uniqueness conflict from
/// the store means another writer stored the same pair first and is
/// treated as an exact duplicate.
pub fn apply<R: ContactRepository>(
    repo: &R,
    observation: &Observation,
    decision: LinkDecision,
) -> RepoResult<Option<Contact>> {
    let new_contact = match decision {
        LinkDecision::CreatePrimary => NewContact::primary(observation),
        LinkDecision::CreateSecondary { linked_id } => NewContact::secondary(observation, linked_id),
        LinkDecision::ExactDuplicate | LinkDecision::NothingNew => return Ok(None),
    };

    match repo.insert(&new_contact) {
        Ok(created) => Ok(Some(created)),
        Err(RepoError::DuplicatePair) => {
            debug!(
                "event=link_insert module=reconcile status=skipped decision={} reason=duplicate_pair",
                decision.as_str()
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::{decide, link_target, LinkDecision};
    use crate::model::contact::{Contact, LinkPrecedence, Observation};
    use crate::reconcile::match_finder::MatchSet;

    fn contact(
        id: i64,
        email: Option<&str>,
        phone: Option<&str>,
        linked_id: Option<i64>,
        created_at: i64,
    ) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id,
            link_precedence: if linked_id.is_some() {
                LinkPrecedence::Secondary
            } else {
                LinkPrecedence::Primary
            },
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    fn observe(email: Option<&str>, phone: Option<&str>) -> Observation {
        Observation::new(email, phone).unwrap()
    }

    #[test]
    fn empty_match_set_creates_primary() {
        let decision = decide(&MatchSet::default(), &observe(Some("a@x.com"), None));
        assert_eq!(decision, LinkDecision::CreatePrimary);
    }

    #[test]
    fn exact_pair_wins_over_new_information() {
        let matches = MatchSet::new(vec![
            contact(1, Some("a@x.com"), None, None, 100),
            contact(2, Some("a@x.com"), Some("111"), Some(1), 200),
        ]);
        let decision = decide(&matches, &observe(Some("a@x.com"), Some("111")));
        assert_eq!(decision, LinkDecision::ExactDuplicate);
    }

    #[test]
    fn subset_of_known_values_creates_nothing() {
        let matches = MatchSet::new(vec![
            contact(1, Some("a@x.com"), Some("111"), None, 100),
            contact(2, Some("b@x.com"), Some("222"), Some(1), 200),
        ]);
        let decision = decide(&matches, &observe(Some("b@x.com"), Some("111")));
        assert_eq!(decision, LinkDecision::NothingNew);
    }

    #[test]
    fn new_phone_links_to_the_matched_primary() {
        let matches = MatchSet::new(vec![contact(1, Some("a@x.com"), Some("111"), None, 100)]);
        let decision = decide(&matches, &observe(Some("a@x.com"), Some("222")));
        assert_eq!(decision, LinkDecision::CreateSecondary { linked_id: 1 });
    }

    #[test]
    fn secondary_reference_resolves_to_its_primary() {
        let matches = MatchSet::new(vec![contact(7, Some("b@x.com"), None, Some(3), 100)]);
        assert_eq!(link_target(&matches), Some(3));
    }

    #[test]
    fn several_primaries_fall_back_to_oldest_match() {
        let matches = MatchSet::new(vec![
            contact(4, None, Some("222"), None, 300),
            contact(2, Some("a@x.com"), None, None, 100),
        ]);
        assert_eq!(link_target(&matches), Some(2));
    }
}
