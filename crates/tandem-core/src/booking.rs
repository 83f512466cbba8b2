//! Booking conflict detection.
//!
//! The underlying store only supports one range predicate per query, so
//! candidate fetching widens the window to
//! `[start - buffer - max_existing_duration, start + duration + buffer]`
//! and the exact overlap test runs here, in memory, against each
//! candidate's own duration.

use crate::config::ScheduleConfig;
use crate::session::Session;
use chrono::{DateTime, Duration, Utc};

/// A proposed booking window `[start, start + duration)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProposedWindow {
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl ProposedWindow {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// The widened `[from, to]` range the candidate query scans.
    ///
    /// A candidate session can start as early as
    /// `buffer + max_existing_duration` before this window and still
    /// reach into it; later than `duration + buffer` after the start it
    /// cannot.
    pub fn query_range(&self, config: &ScheduleConfig) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = self.start
            - Duration::minutes(config.conflict_buffer_minutes)
            - Duration::minutes(config.max_session_duration_minutes);
        let to = self.start
            + Duration::minutes(i64::from(self.duration_minutes))
            + Duration::minutes(config.conflict_buffer_minutes);
        (from, to)
    }
}

/// Exact half-open interval overlap: `startA < endB && endA > startB`.
fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Returns the first candidate whose buffered window overlaps the
/// proposed one, or `None`.
///
/// Candidates are assumed pre-filtered to blocking statuses and the
/// right participant; each is tested with its own duration (falling
/// back to the configured default when zero).
pub fn find_conflict<'a>(
    window: &ProposedWindow,
    candidates: &'a [Session],
    config: &ScheduleConfig,
) -> Option<&'a Session> {
    let buffer = Duration::minutes(config.conflict_buffer_minutes);
    let proposed_start = window.start - buffer;
    let proposed_end = window.end() + buffer;

    candidates.iter().find(|existing| {
        let duration = if existing.duration_minutes == 0 {
            config.default_duration_minutes
        } else {
            existing.duration_minutes
        };
        let existing_end = existing.scheduled_start + Duration::minutes(i64::from(duration));
        overlaps(proposed_start, proposed_end, existing.scheduled_start, existing_end)
    })
}
