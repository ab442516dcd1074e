//! Merge of independently matched primary chains.
//!
//! When one observation reaches more than one group, the oldest group
//! primary survives and every other group primary is demoted beneath it.
//! Contacts linked to a demoted primary are moved to the survivor, so no
//! link ever points at a secondary.
//!
//! # Invariants
//! - Survivor is the minimum of `(created_at, id)`; ties never depend on
//!   store iteration order.
//! - Demotion and re-parenting run inside the caller's unit of work.
//! - Group roots outside the match set are loaded by id, never guessed.

use crate::model::contact::{Contact, ContactId};
use crate::reconcile::match_finder::MatchSet;
use crate::reconcile::{IdentifyError, IdentifyResult};
use crate::repo::contact_repo::ContactRepository;
use log::info;

/// Result of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consolidation {
    /// Primary that owns the merged group.
    pub survivor_id: ContactId,
    /// Former primaries, oldest first.
    pub demoted: Vec<ContactId>,
    /// Contacts moved from a demoted primary to the survivor.
    pub reparented: usize,
}

/// Picks the surviving primary: oldest `created_at`, then smallest `id`.
pub fn select_survivor(primaries: &[Contact]) -> Option<&Contact> {
    primaries.iter().min_by(|left, right| left.cmp_age(right))
}

/// Merges every group reached by `matches` into the oldest one.
///
/// Returns `None` when the match set reaches at most one group.
///
/// # Errors
/// - `ConsistencyViolation` when a group root is missing or is itself
///   secondary.
/// - `StoreUnavailable` when a store mutation fails.
pub fn consolidate<R: ContactRepository>(
    repo: &R,
    matches: &MatchSet,
) -> IdentifyResult<Option<Consolidation>> {
    let mut primaries = group_primaries(repo, matches)?;
    if primaries.len() < 2 {
        return Ok(None);
    }
    primaries.sort_by(Contact::cmp_age);

    let survivor_id = match select_survivor(&primaries) {
        Some(survivor) => survivor.id,
        None => return Ok(None),
    };

    let mut demoted = Vec::with_capacity(primaries.len() - 1);
    let mut reparented = 0;
    for loser in primaries.iter().filter(|primary| primary.id != survivor_id) {
        repo.demote_to_secondary(loser.id, survivor_id)?;
        reparented += repo.reparent(loser.id, survivor_id)?;
        demoted.push(loser.id);
    }

    info!(
        "event=consolidate module=reconcile status=ok survivor_id={survivor_id} demoted_count={} reparented={reparented}",
        demoted.len()
    );

    Ok(Some(Consolidation {
        survivor_id,
        demoted,
        reparented,
    }))
}

fn group_primaries<R: ContactRepository>(
    repo: &R,
    matches: &MatchSet,
) -> IdentifyResult<Vec<Contact>> {
    let mut primaries = Vec::new();
    for root_id in matches.root_ids() {
        let root = match matches.get(root_id) {
            Some(contact) => contact.clone(),
            None => repo.get_contact(root_id)?.ok_or_else(|| {
                IdentifyError::ConsistencyViolation(format!(
                    "group primary {root_id} is missing or deleted"
                ))
            })?,
        };
        if !root.is_primary() {
            return Err(IdentifyError::ConsistencyViolation(format!(
                "contact {root_id} is linked to as a primary but is secondary"
            )));
        }
        primaries.push(root);
    }
    Ok(primaries)
}
