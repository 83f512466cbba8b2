//! Dispute domain model.
//!
//! Disputes are raised by session participants and mutated only by
//! administrators. Every administrative update appends one immutable
//! audit entry capturing the before/after diff.

use crate::error::{Result, TandemError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispute workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Rejected,
    Appealed,
}

impl DisputeStatus {
    /// Whether the workflow permits moving to `next`.
    ///
    /// `open` moves into review or straight to a decision; only a
    /// resolved or rejected dispute can be appealed; an appeal is
    /// decided back into resolved or rejected.
    pub fn can_transition_to(self, next: DisputeStatus) -> bool {
        use DisputeStatus::*;
        matches!(
            (self, next),
            (Open, UnderReview)
                | (Open, Resolved)
                | (Open, Rejected)
                | (UnderReview, Resolved)
                | (UnderReview, Rejected)
                | (Resolved, Appealed)
                | (Rejected, Appealed)
                | (Appealed, Resolved)
                | (Appealed, Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
            DisputeStatus::Appealed => "appealed",
        }
    }
}

/// Why a dispute was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeReason {
    NoShow,
    LeftEarly,
    InappropriateBehavior,
    MisreportedCompletion,
    Other,
}

/// A dispute raised against a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDispute {
    pub id: String,
    pub session_id: String,
    pub reported_by: String,
    pub reported_against: String,
    pub reason: DisputeReason,
    pub description: String,
    #[serde(default)]
    pub evidence_urls: Vec<String>,
    pub status: DisputeStatus,
    pub admin_notes: Option<String>,
    pub resolution: Option<String>,
    pub appeal_reason: Option<String>,
    #[serde(default)]
    pub appeal_evidence_urls: Vec<String>,
    pub appealed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic-concurrency version; bumped by every stored write.
    #[serde(default)]
    pub version: u64,
}

impl SessionDispute {
    pub fn new(
        session_id: impl Into<String>,
        reported_by: impl Into<String>,
        reported_against: impl Into<String>,
        reason: DisputeReason,
        description: impl Into<String>,
        evidence_urls: Vec<String>,
    ) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(TandemError::validation("description is required"));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            reported_by: reported_by.into(),
            reported_against: reported_against.into(),
            reason,
            description,
            evidence_urls,
            status: DisputeStatus::Open,
            admin_notes: None,
            resolution: None,
            appeal_reason: None,
            appeal_evidence_urls: Vec::new(),
            appealed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }
}

/// One immutable audit entry, appended on every administrative update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeAuditEntry {
    pub id: String,
    pub dispute_id: String,
    pub admin_id: String,
    pub action: String,
    pub old_status: DisputeStatus,
    pub new_status: DisputeStatus,
    pub old_notes: Option<String>,
    pub new_notes: Option<String>,
    pub old_resolution: Option<String>,
    pub new_resolution: Option<String>,
    pub appeal_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// MIME types accepted as dispute evidence.
pub const ALLOWED_EVIDENCE_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/gif", "application/pdf"];

/// Per-file evidence size cap (10 MiB).
pub const MAX_EVIDENCE_BYTES: usize = 10 * 1024 * 1024;

/// An evidence file awaiting upload to the object store.
#[derive(Debug, Clone)]
pub struct EvidenceUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl EvidenceUpload {
    /// Validates content type and size before any storage call.
    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_EVIDENCE_TYPES.contains(&self.content_type.as_str()) {
            return Err(TandemError::validation(format!(
                "evidence type '{}' is not allowed",
                self.content_type
            )));
        }
        if self.bytes.len() > MAX_EVIDENCE_BYTES {
            return Err(TandemError::validation(format!(
                "evidence file '{}' exceeds the 10MB limit",
                self.filename
            )));
        }
        Ok(())
    }
}
