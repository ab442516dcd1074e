//! Domain model for identity reconciliation.
//!
//! # Responsibility
//! - Define the `Contact` record and the normalized `Observation` input.
//! - Keep link precedence rules in one place.
//!
//! # Invariants
//! - A contact always carries at least one identifier (email or phone).
//! - `linked_id` is set iff the contact is secondary.
//! - Deletion is represented by `deleted_at` tombstones, not hard delete.

pub mod contact;
