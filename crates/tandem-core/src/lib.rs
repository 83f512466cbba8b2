//! Tandem core: domain models and collaborator traits for paired
//! study-session coordination.
//!
//! This crate owns the entities with real invariants (sessions, the
//! vouch-score ledger, disputes, undo actions), their status state
//! machines, and the traits the outer layers implement: repositories
//! over a document store, an identity verifier, an object store for
//! evidence, and a notification dispatcher.

pub mod analytics;
pub mod booking;
pub mod config;
pub mod dispute;
pub mod error;
pub mod identity;
pub mod notify;
pub mod object_store;
pub mod reputation;
pub mod session;
pub mod undo;

// Re-export common error type
pub use error::{Result, TandemError};
