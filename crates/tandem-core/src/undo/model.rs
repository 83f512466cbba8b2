//! Reversible-action domain model.
//!
//! An `UndoAction` wraps a cancellation for a short TTL. Exactly one of
//! two consumers destroys it: an explicit undo (state restored) or the
//! cleanup sweep at expiry (cancellation finalized). The atomic claim of
//! the record is the linearization point between the two.

use crate::session::SessionSnapshot;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of mutation the undo action wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoKind {
    CancelSession,
}

/// A short-lived reversible wrapper around a cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoAction {
    pub id: String,
    pub kind: UndoKind,
    pub session_id: String,
    /// State to restore if the undo is claimed in time.
    pub previous_state: SessionSnapshot,
    /// The user who performed the cancellation (the only one allowed to
    /// undo it).
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UndoAction {
    pub fn new_cancel(
        session_id: impl Into<String>,
        previous_state: SessionSnapshot,
        user_id: impl Into<String>,
        ttl_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind: UndoKind::CancelSession,
            session_id: session_id.into(),
            previous_state,
            user_id: user_id.into(),
            created_at: now,
            expires_at: now + Duration::seconds(ttl_seconds),
        }
    }

    /// Whether the undo window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
