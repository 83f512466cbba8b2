//! Session domain model.
//!
//! A session is a booked study window shared by exactly two participants.
//! Its status only ever advances along the legal transition table, and the
//! two mutual-confirmation handshakes (start, completion) are recorded
//! directly on the entity so a single conditional write covers both the
//! set-union update and any consequent transition.

use crate::error::{Result, TandemError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Lifecycle status of a session.
///
/// Initial state is `Requested`; `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Booking request created, awaiting acceptance.
    Requested,
    /// Accepted and occupying a calendar slot.
    Scheduled,
    /// Both participants confirmed the start.
    InProgress,
    /// Both participants confirmed completion.
    Completed,
    /// Cancelled from any non-terminal state.
    Cancelled,
}

impl SessionStatus {
    /// Whether the transition table permits moving to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Requested, Scheduled)
                | (Requested, Cancelled)
                | (Scheduled, InProgress)
                | (Scheduled, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }

    /// Statuses that occupy a time slot for conflict detection.
    pub fn is_blocking(self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::InProgress)
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Requested => "requested",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

/// How a no-show sweep classified a missed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoShowKind {
    /// One participant confirmed the start, the other never did.
    Unilateral { absent_user: String },
    /// Neither participant confirmed the start.
    Mutual,
}

/// A paired study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Exactly two distinct participant user ids; order is
    /// requester-first and otherwise has no meaning.
    pub participants: [String; 2],
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Agreed start time.
    pub scheduled_start: DateTime<Utc>,
    /// Agreed duration in minutes.
    pub duration_minutes: u32,
    /// Participants who confirmed the start (size 0-2).
    #[serde(default)]
    pub start_confirmed_by: BTreeSet<String>,
    /// Per-participant completion confirmation flags.
    #[serde(default)]
    pub completion_confirmed_by: BTreeMap<String, bool>,
    /// Stamped when the second start confirmation lands.
    pub actual_start: Option<DateTime<Utc>>,
    /// Minutes actually spent, computed on completion.
    pub actual_duration_minutes: Option<u32>,
    /// Reschedules on this session lineage without an intervening
    /// completion.
    #[serde(default)]
    pub consecutive_reschedule_count: u32,
    /// Stamped by the reminder sweep so a session is reminded once.
    pub reminded_at: Option<DateTime<Utc>>,
    /// Set by no-show detection, consumed once by the penalty sweep.
    pub no_show: Option<NoShowKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; bumped by every stored write.
    #[serde(default)]
    pub version: u64,
}

impl Session {
    /// Creates a new booking request between two distinct participants.
    pub fn new_request(
        requester: impl Into<String>,
        partner: impl Into<String>,
        scheduled_start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Self> {
        let requester = requester.into();
        let partner = partner.into();
        if requester == partner {
            return Err(TandemError::validation(
                "a session needs two distinct participants",
            ));
        }
        if duration_minutes == 0 {
            return Err(TandemError::validation("duration must be positive"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            participants: [requester, partner],
            status: SessionStatus::Requested,
            scheduled_start,
            duration_minutes,
            start_confirmed_by: BTreeSet::new(),
            completion_confirmed_by: BTreeMap::new(),
            actual_start: None,
            actual_duration_minutes: None,
            consecutive_reschedule_count: 0,
            reminded_at: None,
            no_show: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Whether `user_id` is one of the two participants.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The participant that is not `user_id`.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
    }

    /// Scheduled end time.
    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Applies a status transition, rejecting anything outside the table.
    pub fn transition_to(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TandemError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Captures the fields a reversible cancellation must restore.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            start_confirmed_by: self.start_confirmed_by.clone(),
            completion_confirmed_by: self.completion_confirmed_by.clone(),
            actual_start: self.actual_start,
            actual_duration_minutes: self.actual_duration_minutes,
        }
    }

    /// Restores a previously captured snapshot.
    pub fn restore(&mut self, snapshot: &SessionSnapshot) {
        self.status = snapshot.status;
        self.start_confirmed_by = snapshot.start_confirmed_by.clone();
        self.completion_confirmed_by = snapshot.completion_confirmed_by.clone();
        self.actual_start = snapshot.actual_start;
        self.actual_duration_minutes = snapshot.actual_duration_minutes;
        self.updated_at = Utc::now();
    }
}

/// The pre-cancellation state an undo restores, byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub start_confirmed_by: BTreeSet<String>,
    pub completion_confirmed_by: BTreeMap<String, bool>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<u32>,
}
