//! Immutable configuration for the coordination core.
//!
//! Score deltas and scheduling windows are plain data injected into the
//! services that need them, never module-global state. Both structs are
//! deserializable so a deployment can override defaults from a TOML file.

use crate::reputation::VouchEventKind;
use serde::{Deserialize, Serialize};

/// Score bounds and per-event deltas for the reputation ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VouchConfig {
    /// Score assigned to a user with no history.
    pub default_score: i32,
    /// Inclusive lower clamp bound.
    pub min_score: i32,
    /// Inclusive upper clamp bound.
    pub max_score: i32,
    /// Delta for a mutually confirmed completion.
    pub completion_delta: i32,
    /// Delta for a unilateral no-show.
    pub unilateral_no_show_delta: i32,
    /// Delta for a cancellation inside the locked-in window.
    pub cancelled_locked_in_delta: i32,
    /// Delta for a mutual no-show.
    pub mutual_no_show_delta: i32,
    /// Delta applied when the reschedule counter hits the threshold.
    pub consecutive_reschedule_delta: i32,
    /// Reschedules in a row (without an intervening completion) that
    /// trigger the consecutive-reschedule penalty.
    pub reschedule_penalty_threshold: u32,
    /// A completion shorter than this fraction of the scheduled duration
    /// counts as an early ending.
    pub early_ending_ratio: f64,
}

impl Default for VouchConfig {
    fn default() -> Self {
        Self {
            default_score: 80,
            min_score: 0,
            max_score: 100,
            completion_delta: 2,
            unilateral_no_show_delta: -10,
            cancelled_locked_in_delta: -10,
            mutual_no_show_delta: -5,
            consecutive_reschedule_delta: -5,
            reschedule_penalty_threshold: 2,
            early_ending_ratio: 0.75,
        }
    }
}

impl VouchConfig {
    /// Returns the score delta for an event kind.
    pub fn delta_for(&self, kind: VouchEventKind) -> i32 {
        match kind {
            VouchEventKind::CompletionConfirmed => self.completion_delta,
            VouchEventKind::UnilateralNoShow => self.unilateral_no_show_delta,
            VouchEventKind::CancelledLockedIn => self.cancelled_locked_in_delta,
            VouchEventKind::MutualNoShow => self.mutual_no_show_delta,
            VouchEventKind::ConsecutiveReschedule => self.consecutive_reschedule_delta,
            VouchEventKind::RescheduledWithNotice
            | VouchEventKind::RequestAccepted
            | VouchEventKind::RequestDeclined
            | VouchEventKind::StartConfirmed
            | VouchEventKind::CancelledWithNotice => 0,
        }
    }

    /// Clamps a raw score into the configured bounds.
    pub fn clamp(&self, score: i32) -> i32 {
        score.clamp(self.min_score, self.max_score)
    }
}

/// Scheduling windows and sweep parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Buffer applied on both sides of a proposed window during
    /// conflict detection.
    pub conflict_buffer_minutes: i64,
    /// Upper bound on any existing session's duration, used to widen
    /// the single-range candidate query.
    pub max_session_duration_minutes: i64,
    /// Fallback duration for stored sessions missing one.
    pub default_duration_minutes: u32,
    /// Grace period after the scheduled start before a session with
    /// fewer than two start confirmations counts as a no-show.
    pub no_show_grace_minutes: i64,
    /// Sessions starting within this window get a reminder.
    pub reminder_lookahead_minutes: i64,
    /// How long a cancellation stays undoable.
    pub undo_ttl_seconds: i64,
    /// Cancelling closer to the start than this counts as locked-in.
    pub cancellation_notice_minutes: i64,
    /// Users with no session activity for this many days get a nudge.
    pub inactivity_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            conflict_buffer_minutes: 15,
            max_session_duration_minutes: 240,
            default_duration_minutes: 60,
            no_show_grace_minutes: 15,
            reminder_lookahead_minutes: 60,
            undo_ttl_seconds: 30,
            cancellation_notice_minutes: 24 * 60,
            inactivity_days: 14,
        }
    }
}
