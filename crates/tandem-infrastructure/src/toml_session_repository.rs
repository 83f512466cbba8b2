//! File-backed SessionRepository implementation.
//!
//! One TOML document per session under `base_dir/sessions/`. Conditional
//! updates run inside [`AtomicTomlFile::transact`], so the version check
//! and the write happen under the same exclusive file lock and a lost
//! race surfaces as `VersionConflict`, matching the in-memory store.

use crate::dto::SessionDoc;
use crate::storage::atomic_toml::AtomicTomlFile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tandem_core::error::{Result, TandemError};
use tandem_core::session::{Session, SessionRepository, SessionStatus};

/// Directory layout:
/// ```text
/// base_dir/
/// └── sessions/
///     ├── <session-id-1>.toml
///     └── <session-id-2>.toml
/// ```
pub struct TomlSessionRepository {
    sessions_dir: PathBuf,
}

impl TomlSessionRepository {
    /// Creates a repository rooted at `base_dir`, creating the sessions
    /// directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = base_dir.as_ref().join("sessions");
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self { sessions_dir })
    }

    /// Creates a repository at the platform default data location.
    pub fn default_location() -> Result<Self> {
        Self::new(crate::paths::TandemPaths::data_dir()?)
    }

    fn file_for(&self, session_id: &str) -> AtomicTomlFile<SessionDoc> {
        AtomicTomlFile::new(self.sessions_dir.join(format!("{session_id}.toml")))
    }

    fn load_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.sessions_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            match AtomicTomlFile::<SessionDoc>::new(path.clone()).load() {
                Ok(Some(doc)) => sessions.push(doc.into()),
                Ok(None) => {}
                Err(e) => {
                    // One unreadable file should not hide the rest.
                    tracing::warn!("skipping unreadable session file {:?}: {}", path, e);
                }
            }
        }
        Ok(sessions)
    }
}

#[async_trait]
impl SessionRepository for TomlSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.file_for(session_id).load()?.map(Session::from))
    }

    async fn insert(&self, session: &Session) -> Result<()> {
        let file = self.file_for(&session.id);
        let doc = SessionDoc::from(session.clone());
        file.transact(move |current| {
            if current.is_some() {
                return Err(TandemError::conflict(format!(
                    "session '{}' already exists",
                    doc.id
                )));
            }
            Ok((Some(doc), ()))
        })
    }

    async fn update(&self, session: &Session) -> Result<Session> {
        let file = self.file_for(&session.id);
        let incoming = session.clone();
        file.transact(move |current| {
            let stored = current
                .ok_or_else(|| TandemError::not_found("session", &incoming.id))?;
            if stored.version != incoming.version {
                return Err(TandemError::version_conflict("session", &incoming.id));
            }
            let mut next = incoming;
            next.version += 1;
            let doc = SessionDoc::from(next.clone());
            Ok((Some(doc), next))
        })
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.file_for(session_id).remove()
    }

    async fn find_in_start_range(
        &self,
        user_id: &str,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        statuses: &[SessionStatus],
    ) -> Result<Vec<Session>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|s| {
                s.is_participant(user_id)
                    && statuses.contains(&s.status)
                    && s.scheduled_start >= range_start
                    && s.scheduled_start <= range_end
            })
            .collect())
    }

    async fn list_with_status(&self, status: SessionStatus) -> Result<Vec<Session>> {
        Ok(self
            .load_all()?
            .into_iter()
            .filter(|s| s.status == status)
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        self.load_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new_request("alice", "bob", Utc::now() + Duration::hours(3), 60).unwrap()
    }

    #[tokio::test]
    async fn save_and_find_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlSessionRepository::new(temp_dir.path()).unwrap();

        let s = session();
        repo.insert(&s).await.unwrap();

        let loaded = repo.find_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded, s);
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlSessionRepository::new(temp_dir.path()).unwrap();

        let s = session();
        repo.insert(&s).await.unwrap();
        let err = repo.insert(&s).await.unwrap_err();
        assert!(matches!(err, TandemError::Conflict(_)));
    }

    #[tokio::test]
    async fn stale_update_is_a_version_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlSessionRepository::new(temp_dir.path()).unwrap();

        let s = session();
        repo.insert(&s).await.unwrap();

        let updated = repo.update(&s).await.unwrap();
        assert_eq!(updated.version, 1);

        // Second writer still holds version 0.
        let err = repo.update(&s).await.unwrap_err();
        assert!(matches!(err, TandemError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn update_missing_session_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlSessionRepository::new(temp_dir.path()).unwrap();

        let err = repo.update(&session()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let temp_dir = TempDir::new().unwrap();
        let repo = TomlSessionRepository::new(temp_dir.path()).unwrap();

        let requested = session();
        repo.insert(&requested).await.unwrap();

        let mut scheduled = session();
        scheduled.transition_to(SessionStatus::Scheduled).unwrap();
        repo.insert(&scheduled).await.unwrap();

        let hits = repo.list_with_status(SessionStatus::Scheduled).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, scheduled.id);
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }
}
