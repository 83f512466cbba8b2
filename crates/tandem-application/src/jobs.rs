//! Scheduled maintenance jobs.
//!
//! Every job is idempotent: reminders tag the session, no-show
//! penalties go through the ledger's per-event guard, the undo sweep
//! claims atomically, and the rollup upserts by date. `run_all` runs
//! every job and reports each outcome separately; one failing job never
//! stops the others.

use crate::ledger::{ReputationLedger, write_policy};
use crate::undo::UndoManager;
use tandem_infrastructure::with_retry;
use chrono::{Duration, Utc};
use std::sync::Arc;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use tandem_core::analytics::{DailyRollup, RollupRepository};
use tandem_core::config::ScheduleConfig;
use tandem_core::error::Result;
use tandem_core::notify::{Notification, NotificationKind, Notifier};
use tandem_core::reputation::{UserRepository, VouchEventKind};
use tandem_core::session::{NoShowKind, SessionRepository, SessionStatus};

/// The maintenance jobs, in the order `run_all` executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    SessionReminders,
    NoShowDetection,
    NoShowPenalties,
    UndoSweep,
    InactivityNudges,
    DailyRollup,
}

/// One job's result: how many records it touched, or why it failed.
#[derive(Debug)]
pub struct JobOutcome {
    pub kind: JobKind,
    pub result: Result<usize>,
}

pub struct JobRunner {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    rollups: Arc<dyn RollupRepository>,
    ledger: Arc<ReputationLedger>,
    undo: Arc<UndoManager>,
    notifier: Arc<dyn Notifier>,
    config: ScheduleConfig,
}

impl JobRunner {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        rollups: Arc<dyn RollupRepository>,
        ledger: Arc<ReputationLedger>,
        undo: Arc<UndoManager>,
        notifier: Arc<dyn Notifier>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            sessions,
            users,
            rollups,
            ledger,
            undo,
            notifier,
            config,
        }
    }

    /// Runs every job once and collects the per-job outcomes.
    pub async fn run_all(&self) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for kind in JobKind::iter() {
            let result = self.run(kind).await;
            if let Err(err) = &result {
                tracing::error!(job = %kind, error = %err, "job failed");
            }
            outcomes.push(JobOutcome { kind, result });
        }
        outcomes
    }

    /// Runs one job; returns how many records it touched.
    pub async fn run(&self, kind: JobKind) -> Result<usize> {
        match kind {
            JobKind::SessionReminders => self.send_reminders().await,
            JobKind::NoShowDetection => self.detect_no_shows().await,
            JobKind::NoShowPenalties => self.apply_no_show_penalties().await,
            JobKind::UndoSweep => self.undo.finalize_expired().await,
            JobKind::InactivityNudges => self.send_inactivity_nudges().await,
            JobKind::DailyRollup => self.build_daily_rollup().await,
        }
    }

    /// Reminds both participants of sessions starting within the
    /// lookahead window. Tagging `reminded_at` makes repeats no-ops.
    async fn send_reminders(&self) -> Result<usize> {
        let now = Utc::now();
        let horizon = now + Duration::minutes(self.config.reminder_lookahead_minutes);
        let upcoming = self
            .sessions
            .list_with_status(SessionStatus::Scheduled)
            .await?;

        let mut reminded = 0usize;
        for session in upcoming {
            if session.reminded_at.is_some()
                || session.scheduled_start < now
                || session.scheduled_start > horizon
            {
                continue;
            }
            let mut session = session;
            session.reminded_at = Some(now);
            session.updated_at = now;
            match self.sessions.update(&session).await {
                Ok(_) => {}
                // Lost the write; the next run picks the session up
                // again if it still needs a reminder.
                Err(err) if err.is_retryable() => continue,
                Err(err) => return Err(err),
            }

            for user in &session.participants {
                let notification = Notification::new(
                    user.clone(),
                    NotificationKind::SessionReminder,
                    "Upcoming session",
                    format!("Your session starts at {}", session.scheduled_start),
                );
                if let Err(err) = self.notifier.send(notification).await {
                    tracing::warn!(session_id = %session.id, user, error = %err, "reminder failed");
                }
            }
            reminded += 1;
        }
        Ok(reminded)
    }

    /// Flags scheduled sessions whose grace period passed without both
    /// start confirmations. Zero confirmations is a mutual no-show, one
    /// marks the silent participant as absent.
    async fn detect_no_shows(&self) -> Result<usize> {
        let grace = Duration::minutes(self.config.no_show_grace_minutes);
        let now = Utc::now();
        let scheduled = self
            .sessions
            .list_with_status(SessionStatus::Scheduled)
            .await?;

        let mut flagged = 0usize;
        for session in scheduled {
            if session.no_show.is_some() || now < session.scheduled_start + grace {
                continue;
            }
            let kind = match session.start_confirmed_by.len() {
                0 => NoShowKind::Mutual,
                1 => {
                    let absent = session
                        .participants
                        .iter()
                        .find(|p| !session.start_confirmed_by.contains(*p))
                        .cloned();
                    match absent {
                        Some(absent_user) => NoShowKind::Unilateral { absent_user },
                        None => continue,
                    }
                }
                // Both confirmed; the session is late transitioning,
                // not a no-show.
                _ => continue,
            };

            let mut session = session;
            session.no_show = Some(kind);
            session.updated_at = now;
            match self.sessions.update(&session).await {
                Ok(_) => flagged += 1,
                Err(err) if err.is_retryable() => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(flagged)
    }

    /// Settles flagged no-shows: cancels the session, records the
    /// ledger events, and notifies the participants. The cancellation
    /// is won first; penalties only ever follow a session this job
    /// actually cancelled.
    ///
    /// A session that moved on since detection (the second confirmation
    /// arrived late) has its flag cleared instead.
    async fn apply_no_show_penalties(&self) -> Result<usize> {
        let flagged = self
            .sessions
            .list_with_status(SessionStatus::Scheduled)
            .await?;

        let mut settled = 0usize;
        for session in flagged {
            let Some(no_show) = session.no_show.clone() else {
                continue;
            };

            // Fresh read; detection may be stale.
            let Some(current) = self.sessions.find_by_id(&session.id).await? else {
                continue;
            };
            if current.status != SessionStatus::Scheduled {
                continue;
            }
            if current.start_confirmed_by.len() == 2 {
                let mut cleared = current;
                cleared.no_show = None;
                cleared.updated_at = Utc::now();
                match self.sessions.update(&cleared).await {
                    Ok(_) => {}
                    Err(err) if err.is_retryable() => {}
                    Err(err) => return Err(err),
                }
                continue;
            }

            // The conditional cancel is the settlement's commit point.
            // A confirmation that flipped the session to in_progress in
            // the meantime wins; no penalty may land after that.
            let session_id = session.id.as_str();
            let cancelled = with_retry(write_policy(), || async move {
                let Some(mut current) = self.sessions.find_by_id(session_id).await? else {
                    return Ok(false);
                };
                if current.status != SessionStatus::Scheduled {
                    return Ok(false);
                }
                current.transition_to(SessionStatus::Cancelled)?;
                self.sessions.update(&current).await?;
                Ok(true)
            })
            .await?;
            if !cancelled {
                continue;
            }

            match &no_show {
                NoShowKind::Unilateral { absent_user } => {
                    self.ledger
                        .record(absent_user, &session.id, VouchEventKind::UnilateralNoShow)
                        .await?;
                }
                NoShowKind::Mutual => {
                    for user in &session.participants {
                        self.ledger
                            .record(user, &session.id, VouchEventKind::MutualNoShow)
                            .await?;
                    }
                }
            }

            for user in &session.participants {
                let notification = Notification::new(
                    user.clone(),
                    NotificationKind::SessionNoShow,
                    "Session marked as no-show",
                    format!(
                        "Your session on {} was cancelled as a no-show",
                        session.scheduled_start
                    ),
                );
                if let Err(err) = self.notifier.send(notification).await {
                    tracing::warn!(session_id = %session.id, user, error = %err, "no-show notification failed");
                }
            }
            settled += 1;
        }
        Ok(settled)
    }

    /// Nudges users whose reputation record has not moved for the
    /// configured number of days.
    async fn send_inactivity_nudges(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.inactivity_days);
        let users = self.users.list_all().await?;

        let mut nudged = 0usize;
        for user in users {
            if user.updated_at > cutoff {
                continue;
            }
            let notification = Notification::new(
                user.user_id.clone(),
                NotificationKind::InactivityNudge,
                "We miss you",
                "It has been a while since your last session".to_string(),
            );
            if let Err(err) = self.notifier.send(notification).await {
                tracing::warn!(user_id = %user.user_id, error = %err, "nudge failed");
                continue;
            }
            nudged += 1;
        }
        Ok(nudged)
    }

    /// Upserts today's rollup: completion and cancellation counts plus
    /// the average vouch score across all users.
    async fn build_daily_rollup(&self) -> Result<usize> {
        let today = Utc::now().date_naive();
        let sessions = self.sessions.list_all().await?;
        let users = self.users.list_all().await?;

        let mut rollup = DailyRollup {
            date: today,
            sessions_completed: 0,
            sessions_cancelled: 0,
            no_shows: 0,
            average_vouch_score: 0.0,
        };
        for session in &sessions {
            if session.updated_at.date_naive() != today {
                continue;
            }
            match session.status {
                SessionStatus::Completed => rollup.sessions_completed += 1,
                SessionStatus::Cancelled => {
                    rollup.sessions_cancelled += 1;
                    if session.no_show.is_some() {
                        rollup.no_shows += 1;
                    }
                }
                _ => {}
            }
        }
        if !users.is_empty() {
            let total: i64 = users.iter().map(|u| i64::from(u.vouch_score)).sum();
            rollup.average_vouch_score = total as f64 / users.len() as f64;
        }

        self.rollups.upsert(&rollup).await?;
        Ok(1)
    }
}
