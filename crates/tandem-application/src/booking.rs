//! Session booking: requests, acceptance, and rescheduling.
//!
//! Every path that puts a blocking session on a calendar runs the
//! conflict detector for BOTH participants against the proposed window.
//! Acceptance re-checks, since either calendar can have filled up
//! between request and accept.

use crate::ledger::{ReputationLedger, write_policy};
use chrono::{DateTime, Utc};
use tandem_infrastructure::with_retry;
use std::sync::Arc;
use tandem_core::booking::{ProposedWindow, find_conflict};
use tandem_core::config::ScheduleConfig;
use tandem_core::error::{Result, TandemError};
use tandem_core::notify::{Notification, NotificationKind, Notifier};
use tandem_core::reputation::VouchEventKind;
use tandem_core::session::{Session, SessionRepository, SessionStatus};

pub struct BookingService {
    sessions: Arc<dyn SessionRepository>,
    ledger: Arc<ReputationLedger>,
    notifier: Arc<dyn Notifier>,
    config: ScheduleConfig,
}

impl BookingService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        ledger: Arc<ReputationLedger>,
        notifier: Arc<dyn Notifier>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            sessions,
            ledger,
            notifier,
            config,
        }
    }

    /// Creates a session request from `requester` to `partner`.
    ///
    /// The window is validated and conflict-checked for both calendars
    /// up front, so a request that could never be accepted is rejected
    /// immediately.
    pub async fn create_request(
        &self,
        requester: &str,
        partner: &str,
        start: DateTime<Utc>,
        duration_minutes: Option<u32>,
    ) -> Result<Session> {
        let duration = duration_minutes.unwrap_or(self.config.default_duration_minutes);
        self.validate_duration(duration)?;

        let window = ProposedWindow {
            start,
            duration_minutes: duration,
        };
        self.check_both_calendars(&window, requester, partner, None)
            .await?;

        let session = Session::new_request(requester, partner, start, duration)?;
        self.sessions.insert(&session).await?;
        tracing::info!(
            session_id = %session.id,
            requester,
            partner,
            %start,
            duration,
            "session requested"
        );
        Ok(session)
    }

    /// Accepts a pending request; only the invited partner may accept.
    pub async fn accept_request(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let session = with_retry(write_policy(), || async move {
            let mut session = self.load(session_id).await?;
            self.ensure_recipient(&session, user_id)?;
            if session.status != SessionStatus::Requested {
                return Err(TandemError::conflict(format!(
                    "cannot accept a session that is {}",
                    session.status.as_str()
                )));
            }

            // Either calendar may have filled up since the request.
            let window = ProposedWindow {
                start: session.scheduled_start,
                duration_minutes: session.duration_minutes,
            };
            self.check_both_calendars(
                &window,
                &session.participants[0],
                &session.participants[1],
                Some(&session.id),
            )
            .await?;

            session.transition_to(SessionStatus::Scheduled)?;
            self.sessions.update(&session).await
        })
        .await?;

        self.ledger
            .record(user_id, session_id, VouchEventKind::RequestAccepted)
            .await?;
        Ok(session)
    }

    /// Declines a pending request; only the invited partner may decline.
    /// The session moves straight to `cancelled` and the requester is
    /// notified.
    pub async fn decline_request(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let session = with_retry(write_policy(), || async move {
            let mut session = self.load(session_id).await?;
            self.ensure_recipient(&session, user_id)?;
            if session.status != SessionStatus::Requested {
                return Err(TandemError::conflict(format!(
                    "cannot decline a session that is {}",
                    session.status.as_str()
                )));
            }

            session.transition_to(SessionStatus::Cancelled)?;
            self.sessions.update(&session).await
        })
        .await?;

        self.ledger
            .record(user_id, session_id, VouchEventKind::RequestDeclined)
            .await?;
        let requester = session.participants[0].clone();
        let notification = Notification::new(
            requester,
            NotificationKind::SessionCancelled,
            "Session request declined",
            format!("Your session request for {} was declined", session.scheduled_start),
        );
        if let Err(err) = self.notifier.send(notification).await {
            tracing::warn!(session_id, error = %err, "decline notification failed");
        }
        Ok(session)
    }

    /// Moves a scheduled session to a new window.
    ///
    /// The new window is conflict-checked for both participants with the
    /// session itself excluded. Start confirmations and the reminder tag
    /// are cleared, since they applied to the old window. The acting
    /// user's reschedule counter advances; crossing the threshold costs
    /// the consecutive-reschedule penalty.
    pub async fn reschedule(
        &self,
        session_id: &str,
        user_id: &str,
        new_start: DateTime<Utc>,
        new_duration_minutes: Option<u32>,
    ) -> Result<Session> {
        let session = with_retry(write_policy(), || async move {
            let mut session = self.load(session_id).await?;
            if !session.is_participant(user_id) {
                return Err(TandemError::forbidden(format!(
                    "user '{user_id}' is not a participant of session '{session_id}'"
                )));
            }
            if session.status != SessionStatus::Scheduled {
                return Err(TandemError::conflict(format!(
                    "cannot reschedule a session that is {}",
                    session.status.as_str()
                )));
            }

            let duration = new_duration_minutes.unwrap_or(session.duration_minutes);
            self.validate_duration(duration)?;
            let window = ProposedWindow {
                start: new_start,
                duration_minutes: duration,
            };
            self.check_both_calendars(
                &window,
                &session.participants[0],
                &session.participants[1],
                Some(&session.id),
            )
            .await?;

            session.scheduled_start = new_start;
            session.duration_minutes = duration;
            session.start_confirmed_by.clear();
            session.reminded_at = None;
            session.consecutive_reschedule_count += 1;
            session.updated_at = Utc::now();

            self.sessions.update(&session).await
        })
        .await?;

        let kind = self.ledger.record_reschedule(user_id, session_id).await?;
        tracing::info!(session_id, user_id, ?kind, %new_start, "session rescheduled");

        if let Some(other) = session.other_participant(user_id) {
            let notification = Notification::new(
                other,
                NotificationKind::SessionReminder,
                "Session rescheduled",
                format!("Your session moved to {}", session.scheduled_start),
            );
            if let Err(err) = self.notifier.send(notification).await {
                tracing::warn!(session_id, error = %err, "reschedule notification failed");
            }
        }
        Ok(session)
    }

    fn validate_duration(&self, duration_minutes: u32) -> Result<()> {
        if duration_minutes == 0 {
            return Err(TandemError::validation("duration must be positive"));
        }
        if i64::from(duration_minutes) > self.config.max_session_duration_minutes {
            return Err(TandemError::validation(format!(
                "duration {duration_minutes} exceeds the maximum of {} minutes",
                self.config.max_session_duration_minutes
            )));
        }
        Ok(())
    }

    fn ensure_recipient(&self, session: &Session, user_id: &str) -> Result<()> {
        if !session.is_participant(user_id) {
            return Err(TandemError::forbidden(format!(
                "user '{user_id}' is not a participant of session '{}'",
                session.id
            )));
        }
        // participants[0] is the requester.
        if session.participants[0] == user_id {
            return Err(TandemError::forbidden(
                "only the invited partner can respond to a request",
            ));
        }
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| TandemError::not_found("session", session_id))
    }

    async fn check_both_calendars(
        &self,
        window: &ProposedWindow,
        first: &str,
        second: &str,
        exclude: Option<&str>,
    ) -> Result<()> {
        for user in [first, second] {
            let (from, to) = window.query_range(&self.config);
            let candidates = self
                .sessions
                .find_in_start_range(
                    user,
                    from,
                    to,
                    &[SessionStatus::Scheduled, SessionStatus::InProgress],
                )
                .await?;
            let candidates: Vec<Session> = candidates
                .into_iter()
                .filter(|s| Some(s.id.as_str()) != exclude)
                .collect();
            if let Some(existing) = find_conflict(window, &candidates, &self.config) {
                return Err(TandemError::conflict(format!(
                    "user '{user}' already has session '{}' overlapping the requested window",
                    existing.id
                )));
            }
        }
        Ok(())
    }
}
