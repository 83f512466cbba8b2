//! Undo action persistence trait.

use super::model::UndoAction;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Store for pending undo actions.
///
/// The `take*` methods are atomic remove-and-return operations. They are
/// the single linearization point between an explicit undo and the
/// expiry sweep: whichever caller gets `Some` owns the action, the other
/// sees `None` and must treat the record as already consumed.
#[async_trait]
pub trait UndoActionRepository: Send + Sync {
    /// Inserts a new undo action.
    async fn insert(&self, action: &UndoAction) -> Result<()>;

    /// Atomically removes and returns the action, if present.
    async fn take(&self, undo_id: &str) -> Result<Option<UndoAction>>;

    /// Atomically removes and returns the action only if `user_id`
    /// created it. An action owned by someone else is left in place and
    /// `None` is returned.
    async fn take_for_user(&self, undo_id: &str, user_id: &str) -> Result<Option<UndoAction>>;

    /// Reads without consuming (authorization checks, inspection).
    async fn find_by_id(&self, undo_id: &str) -> Result<Option<UndoAction>>;

    /// Lists actions whose `expires_at` is at or before `now`.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<UndoAction>>;
}
