//! Storage DTOs for the file-backed repositories.
//!
//! The on-disk document is a separate type from the domain model so the
//! storage format can reorder fields (TOML wants tables after values)
//! and evolve independently of the domain layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tandem_core::session::{NoShowKind, Session, SessionStatus};

/// On-disk representation of a [`Session`].
///
/// Same data as the domain model, with the table-valued fields
/// (`completion_confirmed_by`, `no_show`) moved to the end for TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDoc {
    pub id: String,
    pub participants: [String; 2],
    pub status: SessionStatus,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: u32,
    #[serde(default)]
    pub start_confirmed_by: BTreeSet<String>,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<u32>,
    #[serde(default)]
    pub consecutive_reschedule_count: u32,
    pub reminded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub completion_confirmed_by: BTreeMap<String, bool>,
    pub no_show: Option<NoShowKind>,
}

impl From<Session> for SessionDoc {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            participants: s.participants,
            status: s.status,
            scheduled_start: s.scheduled_start,
            duration_minutes: s.duration_minutes,
            start_confirmed_by: s.start_confirmed_by,
            actual_start: s.actual_start,
            actual_duration_minutes: s.actual_duration_minutes,
            consecutive_reschedule_count: s.consecutive_reschedule_count,
            reminded_at: s.reminded_at,
            created_at: s.created_at,
            updated_at: s.updated_at,
            version: s.version,
            completion_confirmed_by: s.completion_confirmed_by,
            no_show: s.no_show,
        }
    }
}

impl From<SessionDoc> for Session {
    fn from(d: SessionDoc) -> Self {
        Self {
            id: d.id,
            participants: d.participants,
            status: d.status,
            scheduled_start: d.scheduled_start,
            duration_minutes: d.duration_minutes,
            start_confirmed_by: d.start_confirmed_by,
            completion_confirmed_by: d.completion_confirmed_by,
            actual_start: d.actual_start,
            actual_duration_minutes: d.actual_duration_minutes,
            consecutive_reschedule_count: d.consecutive_reschedule_count,
            reminded_at: d.reminded_at,
            no_show: d.no_show,
            created_at: d.created_at,
            updated_at: d.updated_at,
            version: d.version,
        }
    }
}
