//! Mutual confirmation protocol.
//!
//! Start and completion are two independent handshakes layered on the
//! session state machine. Each call is a set-union update plus, when the
//! second participant lands, the consequent transition, computed from
//! one consistent read and applied with a conditional write. The
//! downstream effects (ledger credit, early-ending evaluation) fire only
//! on the call whose write flipped the transition, so they run exactly
//! once even when both participants race.

use crate::ledger::{ReputationLedger, write_policy};
use chrono::Utc;
use tandem_infrastructure::with_retry;
use std::sync::Arc;
use tandem_core::error::{Result, TandemError};
use tandem_core::notify::{Notification, NotificationKind, Notifier};
use tandem_core::reputation::VouchEventKind;
use tandem_core::session::{
    FeedbackRepository, Session, SessionFeedback, SessionRepository, SessionStatus,
};

/// Outcome of a completion confirmation call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    /// Whether this call flipped the session to `completed`.
    pub triggered: bool,
    /// Set when the triggering call classified the session as ended
    /// early.
    pub early_ending: Option<EarlyEnding>,
}

/// An early-ending classification for a completed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyEnding {
    /// `round(100 * actual / scheduled)`.
    pub percentage: u32,
}

pub struct ConfirmationService {
    sessions: Arc<dyn SessionRepository>,
    feedback: Arc<dyn FeedbackRepository>,
    ledger: Arc<ReputationLedger>,
    notifier: Arc<dyn Notifier>,
}

impl ConfirmationService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        feedback: Arc<dyn FeedbackRepository>,
        ledger: Arc<ReputationLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions,
            feedback,
            ledger,
            notifier,
        }
    }

    /// Confirms the session start for one participant.
    ///
    /// Idempotent: a repeat call from the same participant is a no-op
    /// success. Returns whether this call triggered the transition to
    /// `in_progress`.
    pub async fn confirm_start(&self, session_id: &str, user_id: &str) -> Result<bool> {
        let written = with_retry(write_policy(), || async move {
            let mut session = self.load_for_participant(session_id, user_id).await?;

            if session.start_confirmed_by.contains(user_id) {
                return Ok(None);
            }
            if session.status != SessionStatus::Scheduled {
                return Err(TandemError::conflict(format!(
                    "cannot confirm start while session is {}",
                    session.status.as_str()
                )));
            }

            session.start_confirmed_by.insert(user_id.to_string());
            let triggered = session.start_confirmed_by.len() == 2;
            if triggered {
                session.transition_to(SessionStatus::InProgress)?;
                session.actual_start = Some(Utc::now());
            } else {
                session.updated_at = Utc::now();
            }

            self.sessions.update(&session).await?;
            Ok(Some(triggered))
        })
        .await?;

        // Already confirmed earlier; nothing new to record.
        let Some(triggered) = written else {
            return Ok(false);
        };

        // Informational ledger entry for the confirming user.
        self.ledger
            .record(user_id, session_id, VouchEventKind::StartConfirmed)
            .await?;

        Ok(triggered)
    }

    /// Confirms completion for one participant.
    ///
    /// Idempotent: a participant who already confirmed gets a no-op
    /// success. The triggering call computes the actual duration,
    /// evaluates early ending, credits both participants on the ledger,
    /// and stores any feedback as an independent record.
    pub async fn confirm_completion(
        &self,
        session_id: &str,
        user_id: &str,
        feedback: Option<String>,
        issue_report: Option<String>,
    ) -> Result<CompletionOutcome> {
        let written = with_retry(write_policy(), || async move {
            let mut session = self.load_for_participant(session_id, user_id).await?;

            if session.completion_confirmed_by.get(user_id) == Some(&true) {
                return Ok(None);
            }
            if session.status != SessionStatus::InProgress {
                return Err(TandemError::conflict(format!(
                    "cannot confirm completion while session is {}",
                    session.status.as_str()
                )));
            }

            session
                .completion_confirmed_by
                .insert(user_id.to_string(), true);
            let triggered = session
                .participants
                .iter()
                .all(|p| session.completion_confirmed_by.get(p) == Some(&true));

            let mut early_ending = None;
            if triggered {
                session.transition_to(SessionStatus::Completed)?;
                let actual = match session.actual_start {
                    Some(started) => {
                        let minutes = (Utc::now() - started).num_minutes();
                        u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
                    }
                    // Never started; fall back to the scheduled length.
                    None => session.duration_minutes,
                };
                session.actual_duration_minutes = Some(actual);
                early_ending = evaluate_early_ending(
                    actual,
                    session.duration_minutes,
                    self.ledger.config().early_ending_ratio,
                );
            } else {
                session.updated_at = Utc::now();
            }

            let stored = self.sessions.update(&session).await?;
            Ok(Some((triggered, early_ending, stored)))
        })
        .await?;

        let Some((triggered, early_ending, session)) = written else {
            return Ok(CompletionOutcome {
                triggered: false,
                early_ending: None,
            });
        };

        // Feedback is an independent append-only record; it never
        // blocks or rolls back the transition.
        if feedback.is_some() || issue_report.is_some() {
            let record = SessionFeedback::new(session_id, user_id, feedback, issue_report);
            if let Err(err) = self.feedback.append(&record).await {
                tracing::warn!(session_id, user_id, error = %err, "failed to store feedback");
            }
        }

        if triggered {
            // Exactly once: only the triggering call reaches this, and
            // the ledger's (session, kind, user) guard backstops it.
            for participant in &session.participants {
                self.ledger
                    .record(participant, session_id, VouchEventKind::CompletionConfirmed)
                    .await?;
            }

            if let Some(early) = early_ending {
                self.ledger
                    .record_early_ending(user_id, early.percentage)
                    .await?;
                if let Some(other) = session.other_participant(user_id) {
                    let notification = Notification::new(
                        other,
                        NotificationKind::EarlyEnding,
                        "Session ended early",
                        format!(
                            "Your session ran {}% of its scheduled length",
                            early.percentage
                        ),
                    );
                    if let Err(err) = self.notifier.send(notification).await {
                        tracing::warn!(session_id, error = %err, "early-ending notification failed");
                    }
                }
            }
        }

        Ok(CompletionOutcome {
            triggered,
            early_ending,
        })
    }

    async fn load_for_participant(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| TandemError::not_found("session", session_id))?;
        if !session.is_participant(user_id) {
            return Err(TandemError::forbidden(format!(
                "user '{user_id}' is not a participant of session '{session_id}'"
            )));
        }
        Ok(session)
    }
}

/// `actual < ratio * scheduled` classifies an early ending.
fn evaluate_early_ending(
    actual_minutes: u32,
    scheduled_minutes: u32,
    ratio: f64,
) -> Option<EarlyEnding> {
    if scheduled_minutes == 0 {
        return None;
    }
    let is_early = f64::from(actual_minutes) < ratio * f64::from(scheduled_minutes);
    if !is_early {
        return None;
    }
    let percentage =
        (100.0 * f64::from(actual_minutes) / f64::from(scheduled_minutes)).round() as u32;
    Some(EarlyEnding { percentage })
}
