//! Dispute persistence traits.

use super::model::{DisputeAuditEntry, SessionDispute};
use crate::error::Result;
use async_trait::async_trait;

/// Store for dispute records.
#[async_trait]
pub trait DisputeRepository: Send + Sync {
    /// Finds a dispute by its ID.
    async fn find_by_id(&self, dispute_id: &str) -> Result<Option<SessionDispute>>;

    /// Inserts a new dispute. Fails with `Conflict` if the id exists.
    async fn insert(&self, dispute: &SessionDispute) -> Result<()>;

    /// Conditionally replaces a stored dispute (compare-and-save on
    /// `dispute.version`, `VersionConflict` on a lost race).
    async fn update(&self, dispute: &SessionDispute) -> Result<SessionDispute>;

    /// Lists disputes raised against a session.
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionDispute>>;
}

/// Append-only audit trail, one list per dispute.
#[async_trait]
pub trait DisputeAuditRepository: Send + Sync {
    /// Appends one audit entry.
    async fn append(&self, entry: &DisputeAuditEntry) -> Result<()>;

    /// Lists a dispute's audit entries, oldest first.
    async fn list_for_dispute(&self, dispute_id: &str) -> Result<Vec<DisputeAuditEntry>>;
}
