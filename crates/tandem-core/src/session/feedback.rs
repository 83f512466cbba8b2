//! Post-session feedback and issue reports.
//!
//! These are append-only side records written during completion
//! confirmation. They never block or roll back the status transition.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form feedback (and optionally an issue report) left by one
/// participant when confirming completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFeedback {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub feedback: Option<String>,
    pub issue_report: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionFeedback {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        feedback: Option<String>,
        issue_report: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            feedback,
            issue_report,
            created_at: Utc::now(),
        }
    }
}

/// Append-only store for feedback records.
#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Appends one feedback record.
    async fn append(&self, feedback: &SessionFeedback) -> Result<()>;

    /// Lists feedback for a session, oldest first.
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionFeedback>>;
}
