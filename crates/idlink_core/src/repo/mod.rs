//! Contact store contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the persistence operations reconciliation consumes.
//! - Isolate SQLite query details from reconciliation logic.
//!
//! # Invariants
//! - Every read excludes soft-deleted rows.
//! - Every list read is ordered by `created_at ASC, id ASC`.
//! - Write paths validate contact shape before mutation.

pub mod contact_repo;
pub mod memory_repo;
