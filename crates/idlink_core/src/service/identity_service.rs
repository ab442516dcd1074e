//! Identity reconciliation use-case service.
//!
//! # Responsibility
//! - Validate and normalize one observation.
//! - Run match, link, consolidation and response assembly as one unit of
//!   work against the contact store.
//!
//! # Invariants
//! - Either every mutation of a pass is committed or none is.
//! - The response is read back from the store after all mutations.
//! - Logs carry ids and counts only, never emails or phone numbers.

use crate::model::contact::{Contact, ContactId, Observation};
use crate::reconcile::consolidation::{self, Consolidation};
use crate::reconcile::link_resolver::{self, LinkDecision};
use crate::reconcile::match_finder::{self, MatchSet};
use crate::reconcile::response::{self, IdentifyResponse};
use crate::reconcile::{IdentifyError, IdentifyResult};
use crate::repo::contact_repo::ContactRepository;
use log::{error, info, warn};
use std::time::Instant;

/// Use-case service wrapping a contact repository.
pub struct IdentityService<R: ContactRepository> {
    repo: R,
}

/// Everything one `identify` pass did, alongside its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyOutcome {
    pub response: IdentifyResponse,
    pub decision: LinkDecision,
    /// Contact inserted by this pass, if any.
    pub created: Option<Contact>,
    /// Merge performed by this pass, if any.
    pub consolidation: Option<Consolidation>,
}

impl<R: ContactRepository> IdentityService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Borrows the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Reconciles one observation and returns the canonical merged view.
    ///
    /// # Errors
    /// - `Validation` when both `email` and `phone_number` are absent or blank.
    /// - `StoreUnavailable` when the store fails; nothing is committed.
    /// - `ConsistencyViolation` when stored links are corrupt; nothing is
    ///   committed.
    pub fn identify(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> IdentifyResult<IdentifyResponse> {
        self.identify_with_outcome(email, phone_number)
            .map(|outcome| outcome.response)
    }

    /// Same as `identify`, also reporting what the pass changed.
    pub fn identify_with_outcome(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> IdentifyResult<IdentifyOutcome> {
        let started_at = Instant::now();
        let observation = match Observation::new(email, phone_number) {
            Ok(observation) => observation,
            Err(err) => {
                warn!("event=identify module=service status=rejected error_code=validation_failed");
                return Err(err.into());
            }
        };

        let result = self
            .repo
            .unit_of_work(|repo| reconcile_observation(repo, &observation));

        match &result {
            Ok(outcome) => info!(
                "event=identify module=service status=ok decision={} created_id={} primary_id={} demoted_count={} secondary_count={} duration_ms={}",
                outcome.decision.as_str(),
                outcome
                    .created
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |contact| contact.id.to_string()),
                outcome.response.primary_contact_id,
                outcome
                    .consolidation
                    .as_ref()
                    .map_or(0, |merge| merge.demoted.len()),
                outcome.response.secondary_contact_ids.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err @ IdentifyError::ConsistencyViolation(_)) => error!(
                "event=identify module=service status=error error_code={} duration_ms={} error={err}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=identify module=service status=error error_code={} duration_ms={} error={err}",
                err.code(),
                started_at.elapsed().as_millis()
            ),
        }

        result
    }
}

fn reconcile_observation<R: ContactRepository>(
    repo: &R,
    observation: &Observation,
) -> IdentifyResult<IdentifyOutcome> {
    let mut matches = match_finder::find_matches(repo, observation)?;
    let decision = link_resolver::decide(&matches, observation);
    let created = link_resolver::apply(repo, observation, decision)?;

    // Another writer stored this pair between the read and the insert.
    if matches.is_empty() && created.is_none() {
        matches = match_finder::find_matches(repo, observation)?;
    }

    let consolidation = consolidation::consolidate(repo, &matches)?;
    let primary_id = surviving_primary_id(&matches, created.as_ref(), consolidation.as_ref())?;
    let response = response::assemble(repo, primary_id)?;

    Ok(IdentifyOutcome {
        response,
        decision,
        created,
        consolidation,
    })
}

fn surviving_primary_id(
    matches: &MatchSet,
    created: Option<&Contact>,
    consolidation: Option<&Consolidation>,
) -> IdentifyResult<ContactId> {
    if let Some(merge) = consolidation {
        return Ok(merge.survivor_id);
    }
    if let Some(contact) = created {
        return Ok(contact.root_id());
    }
    matches
        .earliest()
        .map(Contact::root_id)
        .ok_or_else(|| {
            IdentifyError::ConsistencyViolation(
                "observation resolved to no stored contact".to_string(),
            )
        })
}
