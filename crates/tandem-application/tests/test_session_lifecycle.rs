//! End-to-end lifecycle tests wiring the services together over the
//! in-memory store, the way a host application would.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tandem_application::{
    BookingService, ConfirmationService, JobKind, JobRunner, ReputationLedger, UndoManager,
};
use tandem_core::config::{ScheduleConfig, VouchConfig};
use tandem_core::notify::{NotificationKind, Notifier};
use tandem_core::reputation::{UserRepository, VouchEventKind, VouchHistoryRepository};
use tandem_core::session::{SessionRepository, SessionStatus};
use tandem_infrastructure::{ChannelNotifier, InMemoryStore};
use tokio::sync::mpsc::UnboundedReceiver;

struct Harness {
    store: Arc<InMemoryStore>,
    booking: BookingService,
    confirmation: ConfirmationService,
    undo: Arc<UndoManager>,
    jobs: JobRunner,
    notifications: UnboundedReceiver<tandem_core::notify::Notification>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let ledger = Arc::new(ReputationLedger::new(
        store.clone(),
        store.clone(),
        VouchConfig::default(),
    ));
    let (notifier, notifications) = ChannelNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let config = ScheduleConfig::default();

    let booking = BookingService::new(
        store.clone(),
        ledger.clone(),
        notifier.clone(),
        config.clone(),
    );
    let confirmation = ConfirmationService::new(
        store.clone(),
        store.clone(),
        ledger.clone(),
        notifier.clone(),
    );
    let undo = Arc::new(UndoManager::new(
        store.clone(),
        store.clone(),
        ledger.clone(),
        notifier.clone(),
        config.clone(),
    ));
    let jobs = JobRunner::new(
        store.clone(),
        store.clone(),
        store.clone(),
        ledger,
        undo.clone(),
        notifier,
        config,
    );

    Harness {
        store,
        booking,
        confirmation,
        undo,
        jobs,
        notifications,
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn full_happy_path_credits_both_participants() {
    let h = harness();

    let s = h
        .booking
        .create_request("alice", "bob", at(5, 10), Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();

    h.confirmation.confirm_start(&s.id, "alice").await.unwrap();
    assert!(h.confirmation.confirm_start(&s.id, "bob").await.unwrap());

    h.confirmation
        .confirm_completion(&s.id, "alice", Some("solid session".to_string()), None)
        .await
        .unwrap();
    let outcome = h
        .confirmation
        .confirm_completion(&s.id, "bob", None, None)
        .await
        .unwrap();
    assert!(outcome.triggered);

    let stored = SessionRepository::find_by_id(h.store.as_ref(), &s.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);

    for user in ["alice", "bob"] {
        let rep = UserRepository::find_by_id(h.store.as_ref(), user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rep.vouch_score, 82);
        assert_eq!(rep.sessions_completed, 1);
        assert_eq!(rep.consecutive_reschedules, 0);
    }
}

#[tokio::test]
async fn cancel_undo_round_trip_leaves_no_ledger_trace() {
    let h = harness();

    let s = h
        .booking
        .create_request("alice", "bob", at(6, 9), Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();
    h.confirmation.confirm_start(&s.id, "alice").await.unwrap();

    let before = SessionRepository::find_by_id(h.store.as_ref(), &s.id)
        .await
        .unwrap()
        .unwrap();

    let cancellation = h.undo.cancel_session(&s.id, "alice").await.unwrap();
    let restored = h
        .undo
        .undo_cancel(&cancellation.undo_id, "alice")
        .await
        .unwrap();

    assert_eq!(restored.status, before.status);
    assert_eq!(restored.start_confirmed_by, before.start_confirmed_by);
    assert_eq!(restored.completion_confirmed_by, before.completion_confirmed_by);
    assert_eq!(restored.actual_start, before.actual_start);
    assert_eq!(
        restored.actual_duration_minutes,
        before.actual_duration_minutes
    );

    // No cancellation event on either side of the ledger.
    let history = VouchHistoryRepository::list_for_user(h.store.as_ref(), "alice")
        .await
        .unwrap();
    assert!(history.iter().all(|e| {
        e.kind != VouchEventKind::CancelledLockedIn
            && e.kind != VouchEventKind::CancelledWithNotice
    }));

    // The undo sweep finds nothing to finalize.
    assert_eq!(h.jobs.run(JobKind::UndoSweep).await.unwrap(), 0);
}

#[tokio::test]
async fn expired_undo_is_gone_and_penalty_lands() {
    let h = harness();
    // Short-notice session, inside the locked-in window.
    let start = Utc::now() + Duration::hours(2);
    let s = h
        .booking
        .create_request("alice", "bob", start, Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();

    let cancellation = h.undo.cancel_session(&s.id, "alice").await.unwrap();

    // Force-expire by rewriting the stored action.
    let mut action = tandem_core::undo::UndoActionRepository::take(
        h.store.as_ref(),
        &cancellation.undo_id,
    )
    .await
    .unwrap()
    .unwrap();
    action.expires_at = Utc::now() - Duration::seconds(1);
    tandem_core::undo::UndoActionRepository::insert(h.store.as_ref(), &action)
        .await
        .unwrap();

    assert_eq!(h.jobs.run(JobKind::UndoSweep).await.unwrap(), 1);

    // Claimed by the sweep; the explicit undo now reads as missing.
    let err = h
        .undo
        .undo_cancel(&cancellation.undo_id, "alice")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let alice = UserRepository::find_by_id(h.store.as_ref(), "alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.vouch_score, 70);
}

#[tokio::test]
async fn conflicting_booking_is_rejected_across_partners() {
    let h = harness();
    let s = h
        .booking
        .create_request("alice", "bob", at(7, 10), Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();

    let err = h
        .booking
        .create_request("bob", "carol", at(7, 10), Some(30))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    // A different day is fine.
    h.booking
        .create_request("bob", "carol", at(8, 10), Some(30))
        .await
        .unwrap();
}

#[tokio::test]
async fn no_show_pipeline_reaches_the_ledger() {
    let mut h = harness();
    let s = h
        .booking
        .create_request("alice", "bob", Utc::now() + Duration::hours(1), Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();
    h.confirmation.confirm_start(&s.id, "alice").await.unwrap();

    // Push the session into the past, beyond the grace period.
    let mut stored = SessionRepository::find_by_id(h.store.as_ref(), &s.id)
        .await
        .unwrap()
        .unwrap();
    stored.scheduled_start = Utc::now() - Duration::hours(1);
    SessionRepository::update(h.store.as_ref(), &stored)
        .await
        .unwrap();

    assert_eq!(h.jobs.run(JobKind::NoShowDetection).await.unwrap(), 1);
    assert_eq!(h.jobs.run(JobKind::NoShowPenalties).await.unwrap(), 1);

    let bob = UserRepository::find_by_id(h.store.as_ref(), "bob")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.vouch_score, 70);

    let cancelled = SessionRepository::find_by_id(h.store.as_ref(), &s.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    // Both participants heard about it.
    let mut no_show_notices = 0;
    while let Ok(n) = h.notifications.try_recv() {
        if n.kind == NotificationKind::SessionNoShow {
            no_show_notices += 1;
        }
    }
    assert_eq!(no_show_notices, 2);
}

#[tokio::test]
async fn early_ending_is_flagged_with_the_right_percentage() {
    let h = harness();
    let s = h
        .booking
        .create_request("alice", "bob", at(9, 10), Some(60))
        .await
        .unwrap();
    h.booking.accept_request(&s.id, "bob").await.unwrap();
    h.confirmation.confirm_start(&s.id, "alice").await.unwrap();
    h.confirmation.confirm_start(&s.id, "bob").await.unwrap();

    // Pretend the session started 40 minutes ago.
    let mut stored = SessionRepository::find_by_id(h.store.as_ref(), &s.id)
        .await
        .unwrap()
        .unwrap();
    stored.actual_start = Some(Utc::now() - Duration::minutes(40));
    SessionRepository::update(h.store.as_ref(), &stored)
        .await
        .unwrap();

    h.confirmation
        .confirm_completion(&s.id, "alice", None, None)
        .await
        .unwrap();
    let outcome = h
        .confirmation
        .confirm_completion(&s.id, "bob", None, None)
        .await
        .unwrap();

    let early = outcome.early_ending.expect("40 of 60 minutes is early");
    assert_eq!(early.percentage, 67);

    let bob = UserRepository::find_by_id(h.store.as_ref(), "bob")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bob.early_ending_count, 1);
    assert_eq!(bob.early_ending_percentage, Some(67));
}
