//! In-memory document store.
//!
//! A single `InMemoryStore` implements every repository trait over
//! `tokio::sync::RwLock`-guarded maps. Conditional updates compare the
//! incoming entity's `version` against the stored one under the write
//! lock, so a lost race surfaces as `VersionConflict` exactly like it
//! would against a transactional document database. Used for tests and
//! in-process wiring.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tandem_core::analytics::{DailyRollup, RollupRepository};
use tandem_core::dispute::{
    DisputeAuditEntry, DisputeAuditRepository, DisputeRepository, SessionDispute,
};
use tandem_core::error::{Result, TandemError};
use tandem_core::reputation::{
    UserReputation, UserRepository, VouchEventKind, VouchHistoryRepository, VouchScoreEvent,
};
use tandem_core::session::{
    FeedbackRepository, Session, SessionFeedback, SessionRepository, SessionStatus,
};
use tandem_core::undo::{UndoAction, UndoActionRepository};
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreState {
    sessions: HashMap<String, Session>,
    users: HashMap<String, UserReputation>,
    vouch_history: HashMap<String, Vec<VouchScoreEvent>>,
    disputes: HashMap<String, SessionDispute>,
    dispute_audit: HashMap<String, Vec<DisputeAuditEntry>>,
    undo_actions: HashMap<String, UndoAction>,
    feedback: Vec<SessionFeedback>,
    rollups: HashMap<NaiveDate, DailyRollup>,
}

/// In-memory implementation of all Tandem repository traits.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let state = self.state.read().await;
        Ok(state.sessions.get(session_id).cloned())
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        let mut state = self.state.write().await;
        if state.sessions.contains_key(&session.id) {
            return Err(TandemError::conflict(format!(
                "session '{}' already exists",
                session.id
            )));
        }
        state.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<Session> {
        let mut state = self.state.write().await;
        let stored = state
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| TandemError::not_found("session", &session.id))?;
        if stored.version != session.version {
            return Err(TandemError::version_conflict("session", &session.id));
        }
        let mut next = session.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.sessions.remove(session_id);
        Ok(())
    }

    async fn find_in_start_range(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        statuses: &[SessionStatus],
    ) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| {
                s.is_participant(user_id)
                    && statuses.contains(&s.status)
                    && s.scheduled_start >= range_start
                    && s.scheduled_start <= range_end
            })
            .cloned()
            .collect())
    }

    async fn list_with_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        Ok(state.sessions.values().cloned().collect())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserReputation>> {
        let state = self.state.read().await;
        Ok(state.users.get(user_id).cloned())
    }

    async fn insert(&self, reputation: &UserReputation) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&reputation.user_id) {
            return Err(TandemError::conflict(format!(
                "user '{}' already exists",
                reputation.user_id
            )));
        }
        state
            .users
            .insert(reputation.user_id.clone(), reputation.clone());
        Ok(())
    }

    async fn update(&self, reputation: &UserReputation) -> Result<UserReputation> {
        let mut state = self.state.write().await;
        let stored = state
            .users
            .get_mut(&reputation.user_id)
            .ok_or_else(|| TandemError::not_found("user", &reputation.user_id))?;
        if stored.version != reputation.version {
            return Err(TandemError::version_conflict("user", &reputation.user_id));
        }
        let mut next = reputation.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_all(&self) -> Result<Vec<UserReputation>> {
        let state = self.state.read().await;
        Ok(state.users.values().cloned().collect())
    }
}

#[async_trait]
impl VouchHistoryRepository for InMemoryStore {
    async fn append(&self, event: &VouchScoreEvent) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .vouch_history
            .entry(event.user_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<VouchScoreEvent>> {
        let state = self.state.read().await;
        Ok(state.vouch_history.get(user_id).cloned().unwrap_or_default())
    }

    async fn exists(
        &self,
        session_id: &str,
        kind: VouchEventKind,
        user_id: &str,
    ) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state
            .vouch_history
            .get(user_id)
            .map(|events| {
                events
                    .iter()
                    .any(|e| e.session_id == session_id && e.kind == kind)
            })
            .unwrap_or(false))
    }
}

#[async_trait]
impl DisputeRepository for InMemoryStore {
    async fn find_by_id(&self, dispute_id: &str) -> Result<Option<SessionDispute>> {
        let state = self.state.read().await;
        Ok(state.disputes.get(dispute_id).cloned())
    }

    async fn insert(&self, dispute: &SessionDispute) -> Result<()> {
        let mut state = self.state.write().await;
        if state.disputes.contains_key(&dispute.id) {
            return Err(TandemError::conflict(format!(
                "dispute '{}' already exists",
                dispute.id
            )));
        }
        state.disputes.insert(dispute.id.clone(), dispute.clone());
        Ok(())
    }

    async fn update(&self, dispute: &SessionDispute) -> Result<SessionDispute> {
        let mut state = self.state.write().await;
        let stored = state
            .disputes
            .get_mut(&dispute.id)
            .ok_or_else(|| TandemError::not_found("dispute", &dispute.id))?;
        if stored.version != dispute.version {
            return Err(TandemError::version_conflict("dispute", &dispute.id));
        }
        let mut next = dispute.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionDispute>> {
        let state = self.state.read().await;
        Ok(state
            .disputes
            .values()
            .filter(|d| d.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DisputeAuditRepository for InMemoryStore {
    async fn append(&self, entry: &DisputeAuditEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .dispute_audit
            .entry(entry.dispute_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn list_for_dispute(&self, dispute_id: &str) -> Result<Vec<DisputeAuditEntry>> {
        let state = self.state.read().await;
        Ok(state
            .dispute_audit
            .get(dispute_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl UndoActionRepository for InMemoryStore {
    async fn insert(&self, action: &UndoAction) -> Result<()> {
        let mut state = self.state.write().await;
        state.undo_actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn take(&self, undo_id: &str) -> Result<Option<UndoAction>> {
        let mut state = self.state.write().await;
        Ok(state.undo_actions.remove(undo_id))
    }

    async fn take_for_user(&self, undo_id: &str, user_id: &str) -> Result<Option<UndoAction>> {
        let mut state = self.state.write().await;
        // Claim only if owned; a foreign action stays put.
        let owned = state
            .undo_actions
            .get(undo_id)
            .is_some_and(|a| a.user_id == user_id);
        if !owned {
            return Ok(None);
        }
        Ok(state.undo_actions.remove(undo_id))
    }

    async fn find_by_id(&self, undo_id: &str) -> Result<Option<UndoAction>> {
        let state = self.state.read().await;
        Ok(state.undo_actions.get(undo_id).cloned())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<UndoAction>> {
        let state = self.state.read().await;
        Ok(state
            .undo_actions
            .values()
            .filter(|a| a.is_expired(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryStore {
    async fn append(&self, feedback: &SessionFeedback) -> Result<()> {
        let mut state = self.state.write().await;
        state.feedback.push(feedback.clone());
        Ok(())
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionFeedback>> {
        let state = self.state.read().await;
        Ok(state
            .feedback
            .iter()
            .filter(|f| f.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RollupRepository for InMemoryStore {
    async fn upsert(&self, rollup: &DailyRollup) -> Result<()> {
        let mut state = self.state.write().await;
        state.rollups.insert(rollup.date, rollup.clone());
        Ok(())
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Option<DailyRollup>> {
        let state = self.state.read().await;
        Ok(state.rollups.get(&date).cloned())
    }
}
