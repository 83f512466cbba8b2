//! Reputation domain model.
//!
//! A user's Vouch Score is a bounded reliability reputation mutated only
//! by the reputation ledger. Every state-changing ledger call appends
//! exactly one immutable [`VouchScoreEvent`] carrying the previous and
//! new score.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed taxonomy of ledger events.
///
/// Deltas live in `VouchConfig`, not here; the kind only identifies the
/// triggering condition and its default reason text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VouchEventKind {
    CompletionConfirmed,
    UnilateralNoShow,
    CancelledLockedIn,
    MutualNoShow,
    ConsecutiveReschedule,
    RescheduledWithNotice,
    RequestAccepted,
    RequestDeclined,
    StartConfirmed,
    CancelledWithNotice,
}

impl VouchEventKind {
    /// Default reason text recorded on the ledger entry.
    pub fn reason(self) -> &'static str {
        match self {
            Self::CompletionConfirmed => "Session completed and mutually confirmed",
            Self::UnilateralNoShow => "Did not show up for a confirmed session",
            Self::CancelledLockedIn => "Cancelled inside the locked-in window",
            Self::MutualNoShow => "Neither participant showed up",
            Self::ConsecutiveReschedule => "Second reschedule in a row without a completion",
            Self::RescheduledWithNotice => "Rescheduled with notice",
            Self::RequestAccepted => "Session request accepted",
            Self::RequestDeclined => "Session request declined",
            Self::StartConfirmed => "Session start confirmed",
            Self::CancelledWithNotice => "Cancelled with notice",
        }
    }
}

/// The reputation-owned subset of a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: String,
    /// Bounded reliability score, default 80.
    pub vouch_score: i32,
    /// Reschedules in a row without an intervening completion.
    #[serde(default)]
    pub consecutive_reschedules: u32,
    #[serde(default)]
    pub sessions_completed: u32,
    /// Completions that ended before the early-ending threshold.
    #[serde(default)]
    pub early_ending_count: u32,
    /// Percentage of the scheduled duration actually spent, recorded on
    /// the most recent early ending.
    pub early_ending_percentage: Option<u32>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; bumped by every stored write.
    #[serde(default)]
    pub version: u64,
}

impl UserReputation {
    /// Creates a fresh reputation record at the default score.
    pub fn new(user_id: impl Into<String>, default_score: i32) -> Self {
        Self {
            user_id: user_id.into(),
            vouch_score: default_score,
            consecutive_reschedules: 0,
            sessions_completed: 0,
            early_ending_count: 0,
            early_ending_percentage: None,
            updated_at: Utc::now(),
            version: 0,
        }
    }
}

/// One append-only ledger entry. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VouchScoreEvent {
    pub id: String,
    pub user_id: String,
    pub session_id: String,
    pub kind: VouchEventKind,
    pub delta: i32,
    pub previous_score: i32,
    pub new_score: i32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl VouchScoreEvent {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        kind: VouchEventKind,
        delta: i32,
        previous_score: i32,
        new_score: i32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            kind,
            delta,
            previous_score,
            new_score,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&VouchEventKind::CompletionConfirmed).unwrap();
        assert_eq!(json, "\"COMPLETION_CONFIRMED\"");
        let kind: VouchEventKind = serde_json::from_str("\"UNILATERAL_NO_SHOW\"").unwrap();
        assert_eq!(kind, VouchEventKind::UnilateralNoShow);
    }

    #[test]
    fn new_reputation_starts_at_default() {
        let rep = UserReputation::new("alice", 80);
        assert_eq!(rep.vouch_score, 80);
        assert_eq!(rep.consecutive_reschedules, 0);
        assert_eq!(rep.sessions_completed, 0);
    }
}
