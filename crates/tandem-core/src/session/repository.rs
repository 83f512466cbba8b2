//! Session repository trait.
//!
//! Defines the interface for session persistence operations. All writes
//! after the initial insert go through [`SessionRepository::update`], a
//! compare-and-save keyed on the session's `version` field, so racing
//! confirmation calls and sweep jobs never lose updates.

use super::model::{Session, SessionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// An abstract repository for managing session persistence.
///
/// Decouples the coordination workflows from the specific storage
/// mechanism (in-memory map, TOML files, document database).
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Finds a session by its ID.
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Inserts a new session. Fails with `Conflict` if the id exists.
    async fn insert(&self, session: &Session) -> Result<()>;

    /// Conditionally replaces a stored session.
    ///
    /// The write succeeds only if the stored version still equals
    /// `session.version`; the stored copy is then bumped and returned.
    /// A lost race surfaces as `VersionConflict`, which callers resolve
    /// by re-reading and recomputing.
    async fn update(&self, session: &Session) -> Result<Session>;

    /// Deletes a session (account-deletion cascade only).
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Candidate query for conflict detection: sessions where `user_id`
    /// participates, the status is one of `statuses`, and the scheduled
    /// start falls in `[range_start, range_end]`.
    ///
    /// This is deliberately a single range predicate plus equality
    /// filters; the exact overlap test runs in memory on the caller.
    async fn find_in_start_range(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        statuses: &[SessionStatus],
    ) -> Result<Vec<Session>>;

    /// Lists all sessions with the given status.
    async fn list_with_status(&self, status: SessionStatus) -> Result<Vec<Session>>;

    /// Lists every stored session.
    async fn list_all(&self) -> Result<Vec<Session>>;
}
