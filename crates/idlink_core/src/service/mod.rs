//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate reconciliation components into the `identify` use case.
//! - Keep callers decoupled from storage details.

pub mod identity_service;
