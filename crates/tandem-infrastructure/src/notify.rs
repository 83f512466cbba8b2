//! Notification dispatcher implementations.
//!
//! Both are best-effort edges: the core logs a failed delivery and moves
//! on, so neither implementation is allowed to block a workflow.

use async_trait::async_trait;
use tandem_core::error::Result;
use tandem_core::notify::{Notification, Notifier};
use tokio::sync::mpsc;

/// Logs every delivery through `tracing`. The default sink when no real
/// dispatcher is wired up.
#[derive(Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Fans notifications out over an unbounded channel, non-blocking. A
/// dropped receiver just means nobody is listening; the send result is
/// discarded rather than failing the workflow.
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Returns the notifier plus the receiving half.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: Notification) -> Result<()> {
        let _ = self.sender.send(notification);
        Ok(())
    }
}
