//! Reputation ledger service.
//!
//! The only writer of vouch scores. Every state-changing call is an
//! optimistic read-modify-write on the user record followed by exactly
//! one append-only history entry. The (session, kind, user) guard makes
//! each triggering condition drive at most one score mutation, no
//! matter how many times a caller or sweep fires it.

use std::sync::Arc;
use tandem_core::config::VouchConfig;
use tandem_core::error::{Result, TandemError};
use tandem_core::reputation::{
    UserReputation, UserRepository, VouchEventKind, VouchHistoryRepository, VouchScoreEvent,
};
use tandem_infrastructure::{RetryPolicy, with_retry};

/// Bounded attempts for one optimistic write before giving up.
pub(crate) const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Policy for optimistic read-modify-write cycles. Lost version races
/// retry immediately; transient store failures back off exponentially.
pub(crate) fn write_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: MAX_WRITE_ATTEMPTS,
        ..RetryPolicy::default()
    }
}

pub struct ReputationLedger {
    users: Arc<dyn UserRepository>,
    history: Arc<dyn VouchHistoryRepository>,
    config: VouchConfig,
}

impl ReputationLedger {
    pub fn new(
        users: Arc<dyn UserRepository>,
        history: Arc<dyn VouchHistoryRepository>,
        config: VouchConfig,
    ) -> Self {
        Self {
            users,
            history,
            config,
        }
    }

    pub fn config(&self) -> &VouchConfig {
        &self.config
    }

    /// Loads a user's reputation, creating the default record on first
    /// contact.
    pub async fn load_or_create(&self, user_id: &str) -> Result<UserReputation> {
        if let Some(rep) = self.users.find_by_id(user_id).await? {
            return Ok(rep);
        }
        let fresh = UserReputation::new(user_id, self.config.default_score);
        match self.users.insert(&fresh).await {
            Ok(()) => Ok(fresh),
            // Someone else created it between our read and insert.
            Err(TandemError::Conflict(_)) => self
                .users
                .find_by_id(user_id)
                .await?
                .ok_or_else(|| TandemError::not_found("user", user_id)),
            Err(e) => Err(e),
        }
    }

    /// Records a ledger event for a user against a session.
    ///
    /// Returns `Ok(None)` when the (session, kind, user) guard shows the
    /// event was already recorded. Otherwise applies the configured
    /// delta with clamping, the kind's counter side effects, and appends
    /// one history entry.
    ///
    /// The score write is the primary mutation; if the history append
    /// fails afterwards the error is surfaced loudly, but the score
    /// change stands.
    pub async fn record(
        &self,
        user_id: &str,
        session_id: &str,
        kind: VouchEventKind,
    ) -> Result<Option<VouchScoreEvent>> {
        let written = with_retry(write_policy(), || async move {
            if self.history.exists(session_id, kind, user_id).await? {
                return Ok(None);
            }

            let mut rep = self.load_or_create(user_id).await?;
            let delta = self.config.delta_for(kind);
            let previous_score = rep.vouch_score;
            rep.vouch_score = self.config.clamp(previous_score + delta);
            self.apply_side_effects(&mut rep, kind);
            rep.updated_at = chrono::Utc::now();

            let stored = self.users.update(&rep).await?;
            Ok(Some((stored, delta, previous_score)))
        })
        .await?;

        let Some((stored, delta, previous_score)) = written else {
            tracing::debug!(user_id, session_id, ?kind, "ledger event already recorded");
            return Ok(None);
        };

        let event = VouchScoreEvent::new(
            user_id,
            session_id,
            kind,
            delta,
            previous_score,
            stored.vouch_score,
            kind.reason(),
        );
        // Must-not-lose: an append failure is surfaced, not swallowed,
        // even though the score change stands.
        self.history.append(&event).await?;
        tracing::info!(
            user_id,
            session_id,
            ?kind,
            delta,
            new_score = stored.vouch_score,
            "vouch score event recorded"
        );
        Ok(Some(event))
    }

    /// Records a reschedule against the counter state machine.
    ///
    /// The first reschedule in a row is informational and increments the
    /// counter; when the counter would reach the threshold the
    /// consecutive-reschedule penalty applies instead and the counter
    /// resets. Returns the kind that was recorded.
    pub async fn record_reschedule(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<VouchEventKind> {
        let rep = self.load_or_create(user_id).await?;
        let kind = if rep.consecutive_reschedules + 1 >= self.config.reschedule_penalty_threshold {
            VouchEventKind::ConsecutiveReschedule
        } else {
            VouchEventKind::RescheduledWithNotice
        };
        self.record(user_id, session_id, kind).await?;
        Ok(kind)
    }

    /// Marks an early ending on the acting user's record.
    ///
    /// Early endings carry no score delta; they only bump the counter
    /// and remember the latest percentage.
    pub async fn record_early_ending(&self, user_id: &str, percentage: u32) -> Result<()> {
        with_retry(write_policy(), || async move {
            let mut rep = self.load_or_create(user_id).await?;
            rep.early_ending_count += 1;
            rep.early_ending_percentage = Some(percentage);
            rep.updated_at = chrono::Utc::now();
            self.users.update(&rep).await?;
            Ok(())
        })
        .await
    }

    fn apply_side_effects(&self, rep: &mut UserReputation, kind: VouchEventKind) {
        match kind {
            VouchEventKind::CompletionConfirmed => {
                rep.consecutive_reschedules = 0;
                rep.sessions_completed += 1;
            }
            VouchEventKind::ConsecutiveReschedule => {
                rep.consecutive_reschedules = 0;
            }
            VouchEventKind::RescheduledWithNotice => {
                rep.consecutive_reschedules += 1;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_infrastructure::InMemoryStore;

    fn ledger() -> (Arc<InMemoryStore>, ReputationLedger) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = ReputationLedger::new(store.clone(), store.clone(), VouchConfig::default());
        (store, ledger)
    }

    #[tokio::test]
    async fn completion_credits_and_clamps_at_100() {
        let (store, ledger) = ledger();

        // Seed a user at 99.
        let mut rep = ledger.load_or_create("alice").await.unwrap();
        rep.vouch_score = 99;
        UserRepository::update(store.as_ref(), &rep).await.unwrap();

        let event = ledger
            .record("alice", "s1", VouchEventKind::CompletionConfirmed)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(event.previous_score, 99);
        assert_eq!(event.new_score, 100);
        assert_eq!(event.delta, 2);

        let rep = ledger.load_or_create("alice").await.unwrap();
        assert_eq!(rep.vouch_score, 100);
        assert_eq!(rep.sessions_completed, 1);

        let history = store.list_for_user("alice").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_event_is_a_no_op() {
        let (store, ledger) = ledger();

        let first = ledger
            .record("alice", "s1", VouchEventKind::CompletionConfirmed)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = ledger
            .record("alice", "s1", VouchEventKind::CompletionConfirmed)
            .await
            .unwrap();
        assert!(second.is_none());

        assert_eq!(store.list_for_user("alice").await.unwrap().len(), 1);
        assert_eq!(
            ledger.load_or_create("alice").await.unwrap().vouch_score,
            82
        );
    }

    #[tokio::test]
    async fn score_clamps_at_zero() {
        let (store, ledger) = ledger();

        let mut rep = ledger.load_or_create("bob").await.unwrap();
        rep.vouch_score = 3;
        UserRepository::update(store.as_ref(), &rep).await.unwrap();

        let event = ledger
            .record("bob", "s1", VouchEventKind::UnilateralNoShow)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.new_score, 0);
        assert_eq!(event.delta, -10);
    }

    #[tokio::test]
    async fn reschedule_counter_state_machine() {
        let (_store, ledger) = ledger();

        // First reschedule: informational, counter 0 -> 1.
        let kind = ledger.record_reschedule("alice", "s1").await.unwrap();
        assert_eq!(kind, VouchEventKind::RescheduledWithNotice);
        let rep = ledger.load_or_create("alice").await.unwrap();
        assert_eq!(rep.consecutive_reschedules, 1);
        assert_eq!(rep.vouch_score, 80);

        // Second in a row: penalty, counter resets.
        let kind = ledger.record_reschedule("alice", "s1").await.unwrap();
        assert_eq!(kind, VouchEventKind::ConsecutiveReschedule);
        let rep = ledger.load_or_create("alice").await.unwrap();
        assert_eq!(rep.consecutive_reschedules, 0);
        assert_eq!(rep.vouch_score, 75);
    }

    #[tokio::test]
    async fn completion_resets_reschedule_counter() {
        let (_store, ledger) = ledger();

        ledger.record_reschedule("alice", "s1").await.unwrap();
        assert_eq!(
            ledger
                .load_or_create("alice")
                .await
                .unwrap()
                .consecutive_reschedules,
            1
        );

        ledger
            .record("alice", "s1", VouchEventKind::CompletionConfirmed)
            .await
            .unwrap();
        let rep = ledger.load_or_create("alice").await.unwrap();
        assert_eq!(rep.consecutive_reschedules, 0);
        assert_eq!(rep.sessions_completed, 1);
    }

    #[tokio::test]
    async fn informational_events_append_without_delta() {
        let (store, ledger) = ledger();

        let event = ledger
            .record("alice", "s1", VouchEventKind::RequestAccepted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.delta, 0);
        assert_eq!(event.previous_score, event.new_score);
        assert_eq!(store.list_for_user("alice").await.unwrap().len(), 1);
    }

    /// Fails the first few score writes with a transient store error,
    /// then delegates to the real store.
    struct FlakyUsers {
        inner: Arc<InMemoryStore>,
        failures_left: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl UserRepository for FlakyUsers {
        async fn find_by_id(&self, user_id: &str) -> Result<Option<UserReputation>> {
            UserRepository::find_by_id(self.inner.as_ref(), user_id).await
        }

        async fn insert(&self, reputation: &UserReputation) -> Result<()> {
            UserRepository::insert(self.inner.as_ref(), reputation).await
        }

        async fn update(&self, reputation: &UserReputation) -> Result<UserReputation> {
            use std::sync::atomic::Ordering;
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(TandemError::transient("store briefly offline"));
            }
            UserRepository::update(self.inner.as_ref(), reputation).await
        }

        async fn list_all(&self) -> Result<Vec<UserReputation>> {
            UserRepository::list_all(self.inner.as_ref()).await
        }
    }

    #[tokio::test]
    async fn transient_store_failures_back_off_and_recover() {
        let store = Arc::new(InMemoryStore::new());
        let users = Arc::new(FlakyUsers {
            inner: store.clone(),
            failures_left: std::sync::atomic::AtomicU32::new(2),
        });
        let ledger = ReputationLedger::new(users, store.clone(), VouchConfig::default());

        let event = ledger
            .record("alice", "s1", VouchEventKind::CompletionConfirmed)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.new_score, 82);
        assert_eq!(store.list_for_user("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn early_ending_tracks_count_and_percentage() {
        let (_store, ledger) = ledger();

        ledger.record_early_ending("alice", 67).await.unwrap();
        let rep = ledger.load_or_create("alice").await.unwrap();
        assert_eq!(rep.early_ending_count, 1);
        assert_eq!(rep.early_ending_percentage, Some(67));
    }
}
