//! Dispute and appeal workflow.
//!
//! Participants raise disputes; only administrators move them through
//! the workflow. Every administrative update writes its audit entry
//! before any notification goes out, so the trail is complete even when
//! delivery fails.

use crate::ledger::write_policy;
use chrono::Utc;
use tandem_infrastructure::with_retry;
use std::sync::Arc;
use tandem_core::dispute::{
    DisputeAuditEntry, DisputeAuditRepository, DisputeReason, DisputeRepository, DisputeStatus,
    EvidenceUpload, SessionDispute,
};
use tandem_core::error::{Result, TandemError};
use tandem_core::identity::Identity;
use tandem_core::notify::{Notification, NotificationKind, Notifier};
use tandem_core::object_store::ObjectStore;
use tandem_core::session::SessionRepository;
use uuid::Uuid;

pub struct DisputeService {
    disputes: Arc<dyn DisputeRepository>,
    audit: Arc<dyn DisputeAuditRepository>,
    sessions: Arc<dyn SessionRepository>,
    objects: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    /// Administrator user IDs that receive appeal notifications.
    admins: Vec<String>,
}

impl DisputeService {
    pub fn new(
        disputes: Arc<dyn DisputeRepository>,
        audit: Arc<dyn DisputeAuditRepository>,
        sessions: Arc<dyn SessionRepository>,
        objects: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        admins: Vec<String>,
    ) -> Self {
        Self {
            disputes,
            audit,
            sessions,
            objects,
            notifier,
            admins,
        }
    }

    /// Raises a dispute against the other participant of a session.
    ///
    /// Every evidence file is validated before anything is uploaded, so
    /// one bad file rejects the whole submission with no partial
    /// uploads.
    pub async fn raise_dispute(
        &self,
        caller: &Identity,
        session_id: &str,
        reason: DisputeReason,
        description: &str,
        evidence: Vec<EvidenceUpload>,
    ) -> Result<SessionDispute> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| TandemError::not_found("session", session_id))?;
        if !session.is_participant(&caller.user_id) {
            return Err(TandemError::forbidden(format!(
                "user '{}' is not a participant of session '{session_id}'",
                caller.user_id
            )));
        }
        let against = session
            .other_participant(&caller.user_id)
            .ok_or_else(|| TandemError::internal("session has no second participant"))?
            .to_string();

        for file in &evidence {
            file.validate()?;
        }
        let evidence_urls = self.upload_all(evidence).await?;

        let dispute = SessionDispute::new(
            session_id,
            caller.user_id.clone(),
            against.clone(),
            reason,
            description,
            evidence_urls,
        )?;
        self.disputes.insert(&dispute).await?;

        let entry = audit_entry(&dispute, &caller.user_id, "raised", dispute.status, None);
        self.audit.append(&entry).await?;
        tracing::info!(
            dispute_id = %dispute.id,
            session_id,
            reported_by = %caller.user_id,
            ?reason,
            "dispute raised"
        );

        let notification = Notification::new(
            against,
            NotificationKind::DisputeUpdate,
            "A dispute was raised",
            format!("A dispute was raised about your session on {}", session.scheduled_start),
        );
        if let Err(err) = self.notifier.send(notification).await {
            tracing::warn!(dispute_id = %dispute.id, error = %err, "dispute notification failed");
        }
        Ok(dispute)
    }

    /// Administrative status update with notes and resolution text.
    ///
    /// The audit entry is appended before either participant is
    /// notified.
    pub async fn update_dispute(
        &self,
        caller: &Identity,
        dispute_id: &str,
        new_status: DisputeStatus,
        admin_notes: Option<String>,
        resolution: Option<String>,
    ) -> Result<SessionDispute> {
        if !caller.is_admin {
            return Err(TandemError::forbidden(
                "only administrators can update disputes",
            ));
        }
        // An appeal carries a mandatory reason and an appealed-at stamp;
        // it is filed by the reporter, never set through a status update.
        if new_status == DisputeStatus::Appealed {
            return Err(TandemError::validation(
                "a dispute is appealed by its reporter, not by status update",
            ));
        }

        let (dispute, entry) = with_retry(write_policy(), || {
            let admin_notes = admin_notes.clone();
            let resolution = resolution.clone();
            async move {
                let mut dispute = self.load(dispute_id).await?;
                if !dispute.status.can_transition_to(new_status) {
                    return Err(TandemError::InvalidTransition {
                        from: dispute.status.as_str().to_string(),
                        to: new_status.as_str().to_string(),
                    });
                }

                let old_status = dispute.status;
                let old_notes = dispute.admin_notes.clone();
                let old_resolution = dispute.resolution.clone();

                dispute.status = new_status;
                if admin_notes.is_some() {
                    dispute.admin_notes = admin_notes;
                }
                if resolution.is_some() {
                    dispute.resolution = resolution;
                }
                dispute.updated_at = Utc::now();

                let stored = self.disputes.update(&dispute).await?;
                let mut entry =
                    audit_entry(&stored, &caller.user_id, "status_update", old_status, None);
                entry.old_notes = old_notes;
                entry.old_resolution = old_resolution;
                Ok((stored, entry))
            }
        })
        .await?;

        // Audit before notification.
        self.audit.append(&entry).await?;
        tracing::info!(
            dispute_id,
            admin = %caller.user_id,
            status = dispute.status.as_str(),
            "dispute updated"
        );

        // Participants hear about decisions, not intermediate review
        // states.
        if matches!(
            dispute.status,
            DisputeStatus::Resolved | DisputeStatus::Rejected | DisputeStatus::Appealed
        ) {
            self.notify_parties(&dispute).await;
        }
        Ok(dispute)
    }

    /// Appeals a decided dispute.
    ///
    /// Only the original reporter may appeal, a reason is mandatory, and
    /// the dispute must be resolved or rejected. Administrators are
    /// fanned out a notification after the audit entry lands.
    pub async fn appeal(
        &self,
        caller: &Identity,
        dispute_id: &str,
        appeal_reason: &str,
        evidence: Vec<EvidenceUpload>,
    ) -> Result<SessionDispute> {
        if appeal_reason.trim().is_empty() {
            return Err(TandemError::validation("an appeal reason is required"));
        }
        for file in &evidence {
            file.validate()?;
        }

        let (dispute, entry) = with_retry(write_policy(), || async move {
            let mut dispute = self.load(dispute_id).await?;
            if dispute.reported_by != caller.user_id {
                return Err(TandemError::forbidden(
                    "only the reporter can appeal a dispute",
                ));
            }
            // Only a decided dispute can be appealed.
            if !dispute.status.can_transition_to(DisputeStatus::Appealed) {
                return Err(TandemError::InvalidTransition {
                    from: dispute.status.as_str().to_string(),
                    to: DisputeStatus::Appealed.as_str().to_string(),
                });
            }

            let old_status = dispute.status;
            dispute.status = DisputeStatus::Appealed;
            dispute.appeal_reason = Some(appeal_reason.to_string());
            dispute.appealed_at = Some(Utc::now());
            dispute.updated_at = Utc::now();

            let stored = self.disputes.update(&dispute).await?;
            let entry = audit_entry(
                &stored,
                &caller.user_id,
                "appealed",
                old_status,
                Some(appeal_reason.to_string()),
            );
            Ok((stored, entry))
        })
        .await?;

        // Appeal evidence uploads after the status write; a failed
        // upload leaves the appeal standing.
        if !evidence.is_empty() {
            let urls = self.upload_all(evidence).await?;
            let mut with_evidence = dispute.clone();
            with_evidence.appeal_evidence_urls = urls;
            // Best effort; the appeal itself already holds.
            match self.disputes.update(&with_evidence).await {
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(dispute_id, error = %err, "failed to attach appeal evidence")
                }
            }
        }

        self.audit.append(&entry).await?;
        self.notify_parties(&dispute).await;
        for admin in &self.admins {
            let notification = Notification::new(
                admin.clone(),
                NotificationKind::DisputeAppealed,
                "Dispute appealed",
                format!("Dispute {dispute_id} was appealed and needs review"),
            );
            if let Err(err) = self.notifier.send(notification).await {
                tracing::warn!(dispute_id, admin, error = %err, "appeal notification failed");
            }
        }
        Ok(dispute)
    }

    /// Lists all disputes raised against a session.
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<SessionDispute>> {
        self.disputes.list_for_session(session_id).await
    }

    /// Returns a dispute's full audit trail, oldest first.
    pub async fn audit_trail(&self, dispute_id: &str) -> Result<Vec<DisputeAuditEntry>> {
        self.load(dispute_id).await?;
        self.audit.list_for_dispute(dispute_id).await
    }

    async fn notify_parties(&self, dispute: &SessionDispute) {
        for user in [&dispute.reported_by, &dispute.reported_against] {
            let notification = Notification::new(
                user.clone(),
                NotificationKind::DisputeUpdate,
                "Dispute status changed",
                format!("Your dispute is now {}", dispute.status.as_str()),
            );
            if let Err(err) = self.notifier.send(notification).await {
                tracing::warn!(
                    dispute_id = %dispute.id,
                    user,
                    error = %err,
                    "dispute notification failed"
                );
            }
        }
    }

    async fn load(&self, dispute_id: &str) -> Result<SessionDispute> {
        self.disputes
            .find_by_id(dispute_id)
            .await?
            .ok_or_else(|| TandemError::not_found("dispute", dispute_id))
    }

    async fn upload_all(&self, evidence: Vec<EvidenceUpload>) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(evidence.len());
        for file in evidence {
            let url = self
                .objects
                .put(&file.filename, &file.content_type, file.bytes)
                .await?;
            urls.push(url);
        }
        Ok(urls)
    }
}

fn audit_entry(
    dispute: &SessionDispute,
    admin_id: &str,
    action: &str,
    old_status: DisputeStatus,
    appeal_reason: Option<String>,
) -> DisputeAuditEntry {
    DisputeAuditEntry {
        id: Uuid::new_v4().to_string(),
        dispute_id: dispute.id.clone(),
        admin_id: admin_id.to_string(),
        action: action.to_string(),
        old_status,
        new_status: dispute.status,
        old_notes: None,
        new_notes: dispute.admin_notes.clone(),
        old_resolution: None,
        new_resolution: dispute.resolution.clone(),
        appeal_reason,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tandem_core::session::{Session, SessionStatus};
    use tandem_infrastructure::{FsObjectStore, InMemoryStore, TracingNotifier};
    use tempfile::TempDir;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: DisputeService,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let dir = TempDir::new().unwrap();
        let objects = Arc::new(FsObjectStore::new(dir.path()).unwrap());
        let service = DisputeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            objects,
            Arc::new(TracingNotifier::new()),
            vec!["admin-1".to_string(), "admin-2".to_string()],
        );
        Fixture {
            store,
            service,
            _dir: dir,
        }
    }

    async fn completed_session(store: &InMemoryStore) -> Session {
        let mut s =
            Session::new_request("alice", "bob", Utc::now() - Duration::hours(2), 60).unwrap();
        s.transition_to(SessionStatus::Scheduled).unwrap();
        s.transition_to(SessionStatus::InProgress).unwrap();
        s.transition_to(SessionStatus::Completed).unwrap();
        SessionRepository::insert(store, &s).await.unwrap();
        s
    }

    fn png_evidence() -> EvidenceUpload {
        EvidenceUpload {
            filename: "proof.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
        }
    }

    #[tokio::test]
    async fn raise_creates_open_dispute_with_audit_entry() {
        let f = fixture();
        let s = completed_session(&f.store).await;

        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::LeftEarly,
                "partner left after ten minutes",
                vec![png_evidence()],
            )
            .await
            .unwrap();

        assert_eq!(d.status, DisputeStatus::Open);
        assert_eq!(d.reported_against, "bob");
        assert_eq!(d.evidence_urls.len(), 1);

        let trail = f.service.audit_trail(&d.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, "raised");
    }

    #[tokio::test]
    async fn oversized_evidence_rejects_the_whole_submission() {
        let f = fixture();
        let s = completed_session(&f.store).await;

        let big = EvidenceUpload {
            filename: "huge.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: vec![0; tandem_core::dispute::MAX_EVIDENCE_BYTES + 1],
        };
        let err = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![png_evidence(), big],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Validation(_)));
        assert!(f.service.list_for_session(&s.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disallowed_content_type_rejected() {
        let f = fixture();
        let s = completed_session(&f.store).await;

        let exe = EvidenceUpload {
            filename: "malware.exe".to_string(),
            content_type: "application/octet-stream".to_string(),
            bytes: vec![1, 2, 3],
        };
        let err = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::Other,
                "something",
                vec![exe],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Validation(_)));
    }

    #[tokio::test]
    async fn non_admin_cannot_update() {
        let f = fixture();
        let s = completed_session(&f.store).await;
        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![],
            )
            .await
            .unwrap();

        let err = f
            .service
            .update_dispute(
                &Identity::user("alice"),
                &d.id,
                DisputeStatus::Resolved,
                None,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Forbidden(_)));
    }

    #[tokio::test]
    async fn status_update_cannot_mark_a_dispute_appealed() {
        let f = fixture();
        let s = completed_session(&f.store).await;
        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![],
            )
            .await
            .unwrap();
        let admin = Identity::admin("admin-1");
        f.service
            .update_dispute(&admin, &d.id, DisputeStatus::Resolved, None, None)
            .await
            .unwrap();

        // Even on a decided dispute the status-update path refuses
        // "appealed"; that transition carries reason and timestamp and
        // belongs to the reporter.
        let err = f
            .service
            .update_dispute(&admin, &d.id, DisputeStatus::Appealed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Validation(_)));

        let stored = f.service.list_for_session(&s.id).await.unwrap();
        assert_eq!(stored[0].status, DisputeStatus::Resolved);
        assert!(stored[0].appeal_reason.is_none());
        assert!(stored[0].appealed_at.is_none());
    }

    #[tokio::test]
    async fn admin_updates_append_to_the_audit_trail() {
        let f = fixture();
        let s = completed_session(&f.store).await;
        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![],
            )
            .await
            .unwrap();
        let admin = Identity::admin("admin-1");

        f.service
            .update_dispute(
                &admin,
                &d.id,
                DisputeStatus::UnderReview,
                Some("taking a look".to_string()),
                None,
            )
            .await
            .unwrap();
        let resolved = f
            .service
            .update_dispute(
                &admin,
                &d.id,
                DisputeStatus::Resolved,
                None,
                Some("score adjusted".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(resolved.status, DisputeStatus::Resolved);
        assert_eq!(resolved.admin_notes.as_deref(), Some("taking a look"));

        let trail = f.service.audit_trail(&d.id).await.unwrap();
        assert_eq!(trail.len(), 3);
        assert_eq!(trail[1].old_status, DisputeStatus::Open);
        assert_eq!(trail[1].new_status, DisputeStatus::UnderReview);
        assert_eq!(trail[2].new_status, DisputeStatus::Resolved);
        assert_eq!(trail[2].new_resolution.as_deref(), Some("score adjusted"));
    }

    #[tokio::test]
    async fn invalid_transition_rejected() {
        let f = fixture();
        let s = completed_session(&f.store).await;
        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![],
            )
            .await
            .unwrap();
        let admin = Identity::admin("admin-1");
        f.service
            .update_dispute(&admin, &d.id, DisputeStatus::Resolved, None, None)
            .await
            .unwrap();

        let err = f
            .service
            .update_dispute(&admin, &d.id, DisputeStatus::UnderReview, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn appeal_requires_a_decided_dispute_and_a_reason() {
        let f = fixture();
        let s = completed_session(&f.store).await;
        let d = f
            .service
            .raise_dispute(
                &Identity::user("alice"),
                &s.id,
                DisputeReason::NoShow,
                "no partner",
                vec![],
            )
            .await
            .unwrap();
        let alice = Identity::user("alice");

        // Open disputes cannot be appealed through this entry point.
        let err = f
            .service
            .appeal(&alice, &d.id, "unfair", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::InvalidTransition { .. }));

        f.service
            .update_dispute(&Identity::admin("admin-1"), &d.id, DisputeStatus::Rejected, None, None)
            .await
            .unwrap();

        let err = f.service.appeal(&alice, &d.id, "  ", vec![]).await.unwrap_err();
        assert!(matches!(err, TandemError::Validation(_)));

        let err = f
            .service
            .appeal(&Identity::user("bob"), &d.id, "unfair", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::Forbidden(_)));

        let appealed = f
            .service
            .appeal(&alice, &d.id, "evidence was ignored", vec![])
            .await
            .unwrap();
        assert_eq!(appealed.status, DisputeStatus::Appealed);
        assert_eq!(appealed.appeal_reason.as_deref(), Some("evidence was ignored"));

        let trail = f.service.audit_trail(&d.id).await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.action, "appealed");
        assert_eq!(last.appeal_reason.as_deref(), Some("evidence was ignored"));
    }
}
