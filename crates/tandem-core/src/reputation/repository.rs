//! Reputation persistence traits.

use super::model::{UserReputation, VouchEventKind, VouchScoreEvent};
use crate::error::Result;
use async_trait::async_trait;

/// Store for per-user reputation records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Finds a user's reputation record.
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserReputation>>;

    /// Inserts a new record. Fails with `Conflict` if the id exists.
    async fn insert(&self, reputation: &UserReputation) -> Result<()>;

    /// Conditionally replaces a stored record (compare-and-save on
    /// `reputation.version`, `VersionConflict` on a lost race).
    async fn update(&self, reputation: &UserReputation) -> Result<UserReputation>;

    /// Lists every stored reputation record.
    async fn list_all(&self) -> Result<Vec<UserReputation>>;
}

/// Append-only vouch score history, one list per user.
#[async_trait]
pub trait VouchHistoryRepository: Send + Sync {
    /// Appends one ledger entry.
    async fn append(&self, event: &VouchScoreEvent) -> Result<()>;

    /// Lists a user's ledger entries, oldest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<VouchScoreEvent>>;

    /// Whether an entry for this (session, kind, user) triple already
    /// exists. This is the ledger's idempotency guard: each triggering
    /// condition drives at most one score mutation.
    async fn exists(
        &self,
        session_id: &str,
        kind: VouchEventKind,
        user_id: &str,
    ) -> Result<bool>;
}
