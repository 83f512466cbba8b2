//! Reversible cancellations.
//!
//! A cancellation snapshots the session's prior state into a TTL-bound
//! `UndoAction`. Ledger penalties are deferred until the window closes:
//! either the explicit undo claims the action and restores the
//! snapshot, or the expiry sweep claims it and finalizes the
//! cancellation with the appropriate ledger event. Exactly one side
//! wins the atomic claim, so an undone cancellation never needs a
//! score reversal.

use crate::ledger::{ReputationLedger, write_policy};
use chrono::{Duration, Utc};
use tandem_infrastructure::with_retry;
use std::sync::Arc;
use tandem_core::config::ScheduleConfig;
use tandem_core::error::{Result, TandemError};
use tandem_core::notify::{Notification, NotificationKind, Notifier};
use tandem_core::reputation::VouchEventKind;
use tandem_core::session::{Session, SessionRepository, SessionStatus};
use tandem_core::undo::{UndoAction, UndoActionRepository};

/// Outcome of a cancellation: the cancelled session plus the handle
/// that can reverse it until `expires_at`.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub session: Session,
    pub undo_id: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub struct UndoManager {
    sessions: Arc<dyn SessionRepository>,
    undo_actions: Arc<dyn UndoActionRepository>,
    ledger: Arc<ReputationLedger>,
    notifier: Arc<dyn Notifier>,
    config: ScheduleConfig,
}

impl UndoManager {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        undo_actions: Arc<dyn UndoActionRepository>,
        ledger: Arc<ReputationLedger>,
        notifier: Arc<dyn Notifier>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            sessions,
            undo_actions,
            ledger,
            notifier,
            config,
        }
    }

    /// Cancels a session and returns the undo handle.
    ///
    /// The pre-cancellation state is snapshotted first, so an undo
    /// restores confirmations and timestamps byte for byte. No ledger
    /// event is written here; that waits for [`finalize_expired`].
    ///
    /// [`finalize_expired`]: UndoManager::finalize_expired
    pub async fn cancel_session(&self, session_id: &str, user_id: &str) -> Result<Cancellation> {
        let (session, snapshot) = with_retry(write_policy(), || async move {
            let mut session = self
                .sessions
                .find_by_id(session_id)
                .await?
                .ok_or_else(|| TandemError::not_found("session", session_id))?;
            if !session.is_participant(user_id) {
                return Err(TandemError::forbidden(format!(
                    "user '{user_id}' is not a participant of session '{session_id}'"
                )));
            }
            if session.status.is_terminal() {
                return Err(TandemError::conflict(format!(
                    "cannot cancel a session that is {}",
                    session.status.as_str()
                )));
            }

            let snapshot = session.snapshot();
            session.transition_to(SessionStatus::Cancelled)?;
            let stored = self.sessions.update(&session).await?;
            Ok((stored, snapshot))
        })
        .await?;

        let action = UndoAction::new_cancel(
            session_id,
            snapshot,
            user_id,
            self.config.undo_ttl_seconds,
        );
        if let Err(insert_err) = self.undo_actions.insert(&action).await {
            // A cancellation without its handle could never be undone
            // or finalized; put the session back before failing.
            self.roll_back_cancel(session_id, &action).await;
            return Err(insert_err);
        }
        tracing::info!(
            session_id,
            user_id,
            undo_id = %action.id,
            expires_at = %action.expires_at,
            "session cancelled"
        );

        if let Some(other) = session.other_participant(user_id) {
            let notification = Notification::new(
                other,
                NotificationKind::SessionCancelled,
                "Session cancelled",
                format!("Your session on {} was cancelled", session.scheduled_start),
            );
            if let Err(err) = self.notifier.send(notification).await {
                tracing::warn!(session_id, error = %err, "cancellation notification failed");
            }
        }

        Ok(Cancellation {
            undo_id: action.id.clone(),
            expires_at: action.expires_at,
            session,
        })
    }

    /// Reverses a cancellation within its undo window.
    ///
    /// Only the cancelling user can undo, and only while the action is
    /// unclaimed. A handle the sweep already consumed, or one that
    /// belongs to someone else, reads as `NotFound`. An expired handle
    /// that the sweep has not reached yet is finalized here instead of
    /// restored.
    pub async fn undo_cancel(&self, undo_id: &str, user_id: &str) -> Result<Session> {
        let action = self
            .undo_actions
            .take_for_user(undo_id, user_id)
            .await?
            .ok_or_else(|| TandemError::not_found("undo action", undo_id))?;

        if action.is_expired(Utc::now()) {
            self.finalize_action(&action).await?;
            return Err(TandemError::not_found("undo action", undo_id));
        }

        let session_id = action.session_id.as_str();
        let snapshot = &action.previous_state;
        let session = with_retry(write_policy(), || async move {
            let mut session = self
                .sessions
                .find_by_id(session_id)
                .await?
                .ok_or_else(|| TandemError::not_found("session", session_id))?;
            if session.status != SessionStatus::Cancelled {
                return Err(TandemError::conflict(format!(
                    "session is {}, not cancelled",
                    session.status.as_str()
                )));
            }

            session.restore(snapshot);
            self.sessions.update(&session).await
        })
        .await?;

        tracing::info!(
            undo_id,
            session_id = %session.id,
            user_id,
            status = session.status.as_str(),
            "cancellation undone"
        );
        Ok(session)
    }

    /// Sweeps expired undo actions and finalizes their cancellations.
    ///
    /// Each action is claimed atomically before finalizing, so a
    /// concurrent undo and this sweep never both act on the same
    /// cancellation. Returns how many actions were finalized.
    pub async fn finalize_expired(&self) -> Result<usize> {
        let expired = self.undo_actions.list_expired(Utc::now()).await?;
        let mut finalized = 0usize;
        for candidate in expired {
            let Some(action) = self.undo_actions.take(&candidate.id).await? else {
                // Claimed by an undo (or another sweep) in the meantime.
                continue;
            };
            self.finalize_action(&action).await?;
            finalized += 1;
        }
        if finalized > 0 {
            tracing::info!(finalized, "expired undo actions finalized");
        }
        Ok(finalized)
    }

    /// Applies the deferred ledger consequence of a cancellation.
    ///
    /// Cancelling inside the locked-in window (too close to the start)
    /// costs the penalty; cancelling with enough notice is recorded as
    /// informational only.
    async fn finalize_action(&self, action: &UndoAction) -> Result<()> {
        let session = self.sessions.find_by_id(&action.session_id).await?;
        let Some(session) = session else {
            tracing::warn!(
                undo_id = %action.id,
                session_id = %action.session_id,
                "session vanished before its cancellation was finalized"
            );
            return Ok(());
        };
        if session.status != SessionStatus::Cancelled {
            // Restored through some other path; nothing to charge.
            return Ok(());
        }

        // Requested sessions were never locked in; declining costs
        // nothing on the ledger.
        let was_locked_in = action.previous_state.status.is_blocking();
        let notice = session.scheduled_start - action.created_at;
        let kind = if was_locked_in
            && notice < Duration::minutes(self.config.cancellation_notice_minutes)
        {
            VouchEventKind::CancelledLockedIn
        } else {
            VouchEventKind::CancelledWithNotice
        };
        self.ledger
            .record(&action.user_id, &action.session_id, kind)
            .await?;
        Ok(())
    }

    /// Restores a just-cancelled session whose undo handle failed to
    /// persist. A rollback that also fails leaves an orphaned
    /// cancellation, which is logged as an error for the operator.
    async fn roll_back_cancel(&self, session_id: &str, action: &UndoAction) {
        let rolled_back = with_retry(write_policy(), || async move {
            let Some(mut session) = self.sessions.find_by_id(session_id).await? else {
                return Ok(());
            };
            if session.status != SessionStatus::Cancelled {
                return Ok(());
            }
            session.restore(&action.previous_state);
            self.sessions.update(&session).await?;
            Ok(())
        })
        .await;
        if let Err(err) = rolled_back {
            tracing::error!(
                session_id,
                user_id = %action.user_id,
                error = %err,
                "cancellation left standing with no undo handle"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tandem_core::config::VouchConfig;
    use tandem_core::reputation::UserRepository;
    use tandem_infrastructure::{InMemoryStore, TracingNotifier};

    struct Fixture {
        store: Arc<InMemoryStore>,
        manager: UndoManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(ReputationLedger::new(
            store.clone(),
            store.clone(),
            VouchConfig::default(),
        ));
        let manager = UndoManager::new(
            store.clone(),
            store.clone(),
            ledger,
            Arc::new(TracingNotifier::new()),
            ScheduleConfig::default(),
        );
        Fixture { store, manager }
    }

    async fn scheduled_session(
        store: &InMemoryStore,
        start: DateTime<Utc>,
    ) -> Session {
        let mut s = Session::new_request("alice", "bob", start, 60).unwrap();
        s.transition_to(SessionStatus::Scheduled).unwrap();
        s.start_confirmed_by.insert("alice".to_string());
        SessionRepository::insert(store, &s).await.unwrap();
        s
    }

    #[tokio::test]
    async fn cancel_then_undo_restores_the_exact_prior_state() {
        let f = fixture();
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;
        let before = SessionRepository::find_by_id(f.store.as_ref(), &s.id)
            .await
            .unwrap()
            .unwrap();

        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();
        assert_eq!(cancellation.session.status, SessionStatus::Cancelled);

        let restored = f
            .manager
            .undo_cancel(&cancellation.undo_id, "alice")
            .await
            .unwrap();
        assert_eq!(restored.status, before.status);
        assert_eq!(restored.start_confirmed_by, before.start_confirmed_by);
        assert_eq!(restored.completion_confirmed_by, before.completion_confirmed_by);
        assert_eq!(restored.actual_start, before.actual_start);

        // The handle is consumed; a second undo reads as missing.
        let err = f
            .manager
            .undo_cancel(&cancellation.undo_id, "alice")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn undo_is_owner_only() {
        let f = fixture();
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;
        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();

        let err = f
            .manager
            .undo_cancel(&cancellation.undo_id, "bob")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // Still claimable by the owner.
        f.manager
            .undo_cancel(&cancellation.undo_id, "alice")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_is_participant_only_and_needs_a_live_session() {
        let f = fixture();
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;

        let err = f.manager.cancel_session(&s.id, "carol").await.unwrap_err();
        assert!(matches!(err, TandemError::Forbidden(_)));

        f.manager.cancel_session(&s.id, "alice").await.unwrap();
        let err = f.manager.cancel_session(&s.id, "alice").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn expired_handle_is_finalized_not_restored() {
        let f = fixture();
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;
        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();

        // Force the window shut.
        expire_now(&f.store, &cancellation.undo_id).await;

        let err = f
            .manager
            .undo_cancel(&cancellation.undo_id, "alice")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let stored = SessionRepository::find_by_id(f.store.as_ref(), &s.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn sweep_finalizes_with_notice_as_informational() {
        let f = fixture();
        // Three days of notice, well past the locked-in window.
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;
        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();

        expire_now(&f.store, &cancellation.undo_id).await;
        let finalized = f.manager.finalize_expired().await.unwrap();
        assert_eq!(finalized, 1);

        let alice = UserRepository::find_by_id(f.store.as_ref(), "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.vouch_score, 80);
    }

    #[tokio::test]
    async fn sweep_penalizes_a_locked_in_cancellation() {
        let f = fixture();
        // Two hours before start, inside the 24h notice window.
        let s = scheduled_session(&f.store, Utc::now() + Duration::hours(2)).await;
        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();

        expire_now(&f.store, &cancellation.undo_id).await;
        let finalized = f.manager.finalize_expired().await.unwrap();
        assert_eq!(finalized, 1);

        let alice = UserRepository::find_by_id(f.store.as_ref(), "alice")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.vouch_score, 70);
    }

    #[tokio::test]
    async fn sweep_skips_actions_an_undo_already_claimed() {
        let f = fixture();
        let s = scheduled_session(&f.store, Utc::now() + Duration::days(3)).await;
        let cancellation = f.manager.cancel_session(&s.id, "alice").await.unwrap();
        f.manager
            .undo_cancel(&cancellation.undo_id, "alice")
            .await
            .unwrap();

        let finalized = f.manager.finalize_expired().await.unwrap();
        assert_eq!(finalized, 0);

        let alice = UserRepository::find_by_id(f.store.as_ref(), "alice").await.unwrap();
        // No penalty, no record at all for an undone cancellation.
        assert!(alice.is_none());
    }

    /// Rejects every handle write; everything else delegates.
    struct HandlelessUndoStore {
        inner: Arc<InMemoryStore>,
    }

    #[async_trait::async_trait]
    impl UndoActionRepository for HandlelessUndoStore {
        async fn insert(&self, _action: &UndoAction) -> tandem_core::error::Result<()> {
            Err(TandemError::transient("undo store offline"))
        }

        async fn take(&self, undo_id: &str) -> tandem_core::error::Result<Option<UndoAction>> {
            UndoActionRepository::take(self.inner.as_ref(), undo_id).await
        }

        async fn take_for_user(
            &self,
            undo_id: &str,
            user_id: &str,
        ) -> tandem_core::error::Result<Option<UndoAction>> {
            UndoActionRepository::take_for_user(self.inner.as_ref(), undo_id, user_id).await
        }

        async fn find_by_id(&self, undo_id: &str) -> tandem_core::error::Result<Option<UndoAction>> {
            UndoActionRepository::find_by_id(self.inner.as_ref(), undo_id).await
        }

        async fn list_expired(
            &self,
            now: chrono::DateTime<Utc>,
        ) -> tandem_core::error::Result<Vec<UndoAction>> {
            UndoActionRepository::list_expired(self.inner.as_ref(), now).await
        }
    }

    #[tokio::test]
    async fn failed_handle_write_rolls_the_cancellation_back() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = Arc::new(ReputationLedger::new(
            store.clone(),
            store.clone(),
            VouchConfig::default(),
        ));
        let manager = UndoManager::new(
            store.clone(),
            Arc::new(HandlelessUndoStore {
                inner: store.clone(),
            }),
            ledger,
            Arc::new(TracingNotifier::new()),
            ScheduleConfig::default(),
        );
        let s = scheduled_session(&store, Utc::now() + Duration::days(3)).await;

        let err = manager.cancel_session(&s.id, "alice").await.unwrap_err();
        assert!(matches!(err, TandemError::TransientStore(_)));

        // The session came back exactly as it was.
        let stored = SessionRepository::find_by_id(store.as_ref(), &s.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SessionStatus::Scheduled);
        assert!(stored.start_confirmed_by.contains("alice"));
    }

    async fn expire_now(store: &InMemoryStore, undo_id: &str) {
        let mut action = UndoActionRepository::take(store, undo_id)
            .await
            .unwrap()
            .unwrap();
        action.expires_at = Utc::now() - Duration::seconds(1);
        UndoActionRepository::insert(store, &action).await.unwrap();
    }
}
