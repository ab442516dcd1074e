//! Contact domain model.
//!
//! # Responsibility
//! - Define the canonical contact row shared by store and reconciliation.
//! - Validate per-record link invariants before persistence and after reads.
//!
//! # Invariants
//! - `id` is assigned by the store and never reused.
//! - `created_at` never changes and is the ordering key for tie-breaks.
//! - A secondary never links to itself.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned contact identifier.
pub type ContactId = i64;

/// Role of a contact inside its identity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkPrecedence {
    /// Canonical representative of the group.
    Primary,
    /// Auxiliary record linked to a primary.
    Secondary,
}

impl LinkPrecedence {
    /// Returns the persisted string form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    /// Parses the persisted string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            _ => None,
        }
    }
}

/// Per-record invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactValidationError {
    /// Both email and phone number are absent.
    MissingIdentifiers,
    /// Primary contact carries a `linked_id`.
    PrimaryWithLink { linked_id: ContactId },
    /// Secondary contact has no `linked_id`.
    SecondaryWithoutLink,
    /// Secondary contact links to itself.
    SelfLink(ContactId),
}

impl Display for ContactValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifiers => {
                write!(f, "either email or phoneNumber must be provided")
            }
            Self::PrimaryWithLink { linked_id } => {
                write!(f, "primary contact must not link to another contact (linked_id={linked_id})")
            }
            Self::SecondaryWithoutLink => write!(f, "secondary contact requires linked_id"),
            Self::SelfLink(id) => write!(f, "contact {id} cannot link to itself"),
        }
    }
}

impl Error for ContactValidationError {}

/// Persisted contact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// Primary this contact belongs to. `None` for primaries.
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
    /// Epoch ms. Authoritative ordering key.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
    /// Epoch ms soft-delete tombstone.
    pub deleted_at: Option<i64>,
}

impl Contact {
    /// Checks identifier presence and link shape.
    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_shape(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )?;
        if self.linked_id == Some(self.id) {
            return Err(ContactValidationError::SelfLink(self.id));
        }
        Ok(())
    }

    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    /// Returns whether this contact is visible to reconciliation.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Id of the primary owning this contact's group.
    ///
    /// Resolves exactly one level: a primary returns its own id, a
    /// secondary returns its `linked_id`.
    pub fn root_id(&self) -> ContactId {
        match self.link_precedence {
            LinkPrecedence::Primary => self.id,
            LinkPrecedence::Secondary => self.linked_id.unwrap_or(self.id),
        }
    }

    /// Total order used for every tie-break: `created_at`, then `id`.
    pub fn ordering_key(&self) -> (i64, ContactId) {
        (self.created_at, self.id)
    }

    /// Compares two contacts by `ordering_key`.
    pub fn cmp_age(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }

    /// Whether this contact carries exactly the observed pair.
    ///
    /// A missing field only matches a missing field.
    pub fn has_pair(&self, observation: &Observation) -> bool {
        self.email.as_deref() == observation.email()
            && self.phone_number.as_deref() == observation.phone_number()
    }
}

/// Insert payload for a contact not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub linked_id: Option<ContactId>,
    pub link_precedence: LinkPrecedence,
}

impl NewContact {
    /// Builds a new primary carrying the observed pair.
    pub fn primary(observation: &Observation) -> Self {
        Self {
            email: observation.email.clone(),
            phone_number: observation.phone_number.clone(),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
        }
    }

    /// Builds a new secondary carrying the observed pair, linked to `primary_id`.
    pub fn secondary(observation: &Observation, primary_id: ContactId) -> Self {
        Self {
            email: observation.email.clone(),
            phone_number: observation.phone_number.clone(),
            linked_id: Some(primary_id),
            link_precedence: LinkPrecedence::Secondary,
        }
    }

    pub fn validate(&self) -> Result<(), ContactValidationError> {
        validate_shape(
            self.email.as_deref(),
            self.phone_number.as_deref(),
            self.link_precedence,
            self.linked_id,
        )
    }
}

/// One normalized `(email?, phoneNumber?)` pair submitted for identification.
///
/// # Invariants
/// - Values are trimmed; blank values are treated as absent.
/// - At least one value is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    email: Option<String>,
    phone_number: Option<String>,
}

impl Observation {
    /// Normalizes raw input into an observation.
    ///
    /// # Errors
    /// - `MissingIdentifiers` when both values are absent or blank.
    pub fn new(
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Self, ContactValidationError> {
        let email = normalize_identifier(email);
        let phone_number = normalize_identifier(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(ContactValidationError::MissingIdentifiers);
        }
        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn normalize_identifier(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

fn validate_shape(
    email: Option<&str>,
    phone_number: Option<&str>,
    precedence: LinkPrecedence,
    linked_id: Option<ContactId>,
) -> Result<(), ContactValidationError> {
    if email.is_none() && phone_number.is_none() {
        return Err(ContactValidationError::MissingIdentifiers);
    }
    match (precedence, linked_id) {
        (LinkPrecedence::Primary, Some(linked_id)) => {
            Err(ContactValidationError::PrimaryWithLink { linked_id })
        }
        (LinkPrecedence::Secondary, None) => Err(ContactValidationError::SecondaryWithoutLink),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{Contact, ContactValidationError, LinkPrecedence, NewContact, Observation};

    fn contact(id: i64, email: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            id,
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            linked_id: None,
            link_precedence: LinkPrecedence::Primary,
            created_at: 1_000,
            updated_at: 1_000,
            deleted_at: None,
        }
    }

    #[test]
    fn observation_trims_and_drops_blank_values() {
        let observation = Observation::new(Some("  a@x.com "), Some("   ")).unwrap();
        assert_eq!(observation.email(), Some("a@x.com"));
        assert_eq!(observation.phone_number(), None);
    }

    #[test]
    fn observation_requires_one_identifier() {
        assert_eq!(
            Observation::new(None, Some("")).unwrap_err(),
            ContactValidationError::MissingIdentifiers
        );
    }

    #[test]
    fn has_pair_treats_missing_as_null_on_both_sides() {
        let stored = contact(1, Some("a@x.com"), None);
        let email_only = Observation::new(Some("a@x.com"), None).unwrap();
        let with_phone = Observation::new(Some("a@x.com"), Some("111")).unwrap();
        assert!(stored.has_pair(&email_only));
        assert!(!stored.has_pair(&with_phone));
    }

    #[test]
    fn validate_rejects_bad_link_shapes() {
        let mut primary = contact(1, Some("a@x.com"), None);
        primary.linked_id = Some(2);
        assert!(matches!(
            primary.validate(),
            Err(ContactValidationError::PrimaryWithLink { linked_id: 2 })
        ));

        let mut secondary = contact(3, None, Some("111"));
        secondary.link_precedence = LinkPrecedence::Secondary;
        assert_eq!(
            secondary.validate(),
            Err(ContactValidationError::SecondaryWithoutLink)
        );

        secondary.linked_id = Some(3);
        assert_eq!(secondary.validate(), Err(ContactValidationError::SelfLink(3)));
    }

    #[test]
    fn root_id_resolves_one_level() {
        let primary = contact(1, Some("a@x.com"), None);
        let mut secondary = contact(2, Some("b@x.com"), None);
        secondary.link_precedence = LinkPrecedence::Secondary;
        secondary.linked_id = Some(1);
        assert_eq!(primary.root_id(), 1);
        assert_eq!(secondary.root_id(), 1);
    }

    #[test]
    fn new_secondary_copies_observed_pair() {
        let observation = Observation::new(Some("a@x.com"), Some("222")).unwrap();
        let new_contact = NewContact::secondary(&observation, 7);
        assert_eq!(new_contact.linked_id, Some(7));
        assert_eq!(new_contact.phone_number.as_deref(), Some("222"));
        assert!(new_contact.validate().is_ok());
    }
}
