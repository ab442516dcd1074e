//! Identity reconciliation components.
//!
//! # Responsibility
//! - `match_finder`: collect active contacts intersecting an observation.
//! - `link_resolver`: decide whether the observation needs a new contact.
//! - `consolidation`: merge independently matched primary chains.
//! - `response`: rebuild the canonical merged view of one group.
//!
//! # Invariants
//! - Every secondary links directly to a primary (depth is at most one).
//! - A group has exactly one primary once a pass completes.
//! - Precedence only moves primary -> secondary, never back.
//! - Components never open their own transaction; the caller wraps a pass
//!   in `ContactRepository::unit_of_work`.

use crate::model::contact::ContactValidationError;
use crate::repo::contact_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod consolidation;
pub mod link_resolver;
pub mod match_finder;
pub mod response;

pub type IdentifyResult<T> = Result<T, IdentifyError>;

/// Failure categories surfaced by `identify`.
#[derive(Debug)]
pub enum IdentifyError {
    /// Neither email nor phone number was provided.
    Validation(ContactValidationError),
    /// Contact store unreachable or its transaction aborted.
    StoreUnavailable(RepoError),
    /// Stored links break group invariants. Indicates a defect; the
    /// pass is rolled back and nothing is repaired.
    ConsistencyViolation(String),
}

impl IdentifyError {
    /// Stable machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_failed",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::ConsistencyViolation(_) => "consistency_violation",
        }
    }
}

impl Display for IdentifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::StoreUnavailable(err) => write!(f, "contact store unavailable: {err}"),
            Self::ConsistencyViolation(message) => {
                write!(f, "contact link consistency violation: {message}")
            }
        }
    }
}

impl Error for IdentifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::StoreUnavailable(err) => Some(err),
            Self::ConsistencyViolation(_) => None,
        }
    }
}

impl From<ContactValidationError> for IdentifyError {
    fn from(value: ContactValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for IdentifyError {
    fn from(value: RepoError) -> Self {
        match value {
            // Payloads are built by reconciliation itself, and reads only
            // fail validation on corrupted links.
            RepoError::Validation(_)
            | RepoError::InvalidData(_)
            | RepoError::AlreadySecondary { .. } => Self::ConsistencyViolation(value.to_string()),
            other => Self::StoreUnavailable(other),
        }
    }
}
