//! Canonical merged view of one identity group.

use crate::model::contact::{Contact, ContactId};
use crate::reconcile::{IdentifyError, IdentifyResult};
use crate::repo::contact_repo::ContactRepository;
use serde::{Deserialize, Serialize};

/// Consolidated identity returned by `identify`.
///
/// Serialized with camelCase keys (`primaryContactId`, `phoneNumbers`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyResponse {
    pub primary_contact_id: ContactId,
    /// Primary email first, then secondaries oldest first, no repeats.
    pub emails: Vec<String>,
    /// Primary phone first, then secondaries oldest first, no repeats.
    pub phone_numbers: Vec<String>,
    /// Secondary ids, oldest first.
    pub secondary_contact_ids: Vec<ContactId>,
}

/// Loads the group of `primary_id` and builds its merged view.
pub fn assemble<R: ContactRepository>(
    repo: &R,
    primary_id: ContactId,
) -> IdentifyResult<IdentifyResponse> {
    let group = repo.find_group(primary_id)?;
    build_response(primary_id, &group)
}

/// Builds the merged view from an already loaded group.
///
/// # Errors
/// - `ConsistencyViolation` when the group does not hold exactly one
///   primary with id `primary_id`, or when a member links elsewhere.
pub fn build_response(
    primary_id: ContactId,
    group: &[Contact],
) -> IdentifyResult<IdentifyResponse> {
    let primary = group
        .iter()
        .find(|contact| contact.id == primary_id)
        .ok_or_else(|| {
            IdentifyError::ConsistencyViolation(format!("primary {primary_id} is not in its group"))
        })?;
    if !primary.is_primary() {
        return Err(IdentifyError::ConsistencyViolation(format!(
            "group root {primary_id} is secondary"
        )));
    }

    let mut secondaries: Vec<&Contact> = group
        .iter()
        .filter(|contact| contact.id != primary_id)
        .collect();
    secondaries.sort_by(|left, right| left.cmp_age(right));

    for secondary in &secondaries {
        if secondary.is_primary() {
            return Err(IdentifyError::ConsistencyViolation(format!(
                "group {primary_id} holds a second primary {}",
                secondary.id
            )));
        }
        if secondary.linked_id != Some(primary_id) {
            return Err(IdentifyError::ConsistencyViolation(format!(
                "secondary {} does not link to group primary {primary_id}",
                secondary.id
            )));
        }
    }

    let mut emails = Vec::new();
    let mut phone_numbers = Vec::new();
    for contact in std::iter::once(primary).chain(secondaries.iter().copied()) {
        push_unique(&mut emails, contact.email.as_deref());
        push_unique(&mut phone_numbers, contact.phone_number.as_deref());
    }

    Ok(IdentifyResponse {
        primary_contact_id: primary_id,
        emails,
        phone_numbers,
        secondary_contact_ids: secondaries.iter().map(|contact| contact.id).collect(),
    })
}

fn push_unique(values: &mut Vec<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !values.iter().any(|existing| existing == value) {
            values.push(value.to_string());
        }
    }
}
