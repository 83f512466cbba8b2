//! Notification dispatch trait.
//!
//! Notifications are best-effort. Workflows inject a [`Notifier`] rather
//! than importing a sender directly, and a delivery failure is logged by
//! the caller but never rolls back the originating mutation.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Closed set of notification kinds the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    SessionReminder,
    SessionCancelled,
    SessionNoShow,
    EarlyEnding,
    DisputeUpdate,
    DisputeAppealed,
    InactivityNudge,
}

/// A single outbound notification payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    #[serde(default)]
    pub send_email: bool,
    pub email: Option<String>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
            title: title.into(),
            message: message.into(),
            link: None,
            send_email: false,
            email: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// Best-effort notification dispatcher.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification. Failures are surfaced to the caller,
    /// which logs and moves on.
    async fn send(&self, notification: Notification) -> Result<()>;
}
