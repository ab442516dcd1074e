//! Core identity reconciliation logic for idlink.
//! This crate is the single source of truth for contact link invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use config::{ConfigError, IdentityConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact, Observation,
};
pub use reconcile::consolidation::Consolidation;
pub use reconcile::link_resolver::LinkDecision;
pub use reconcile::response::IdentifyResponse;
pub use reconcile::{IdentifyError, IdentifyResult};
pub use repo::contact_repo::{ContactRepository, RepoError, RepoResult, SqliteContactRepository};
pub use repo::memory_repo::InMemoryContactRepository;
pub use service::identity_service::{IdentifyOutcome, IdentityService};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
