//! TOML file-per-session repository.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use valet_core::session::{Session, SessionRepository};
use valet_core::{Result, ValetError};

/// Stores each session as `<sessions_dir>/<id>.toml`.
pub struct FileSessionRepository {
    sessions_dir: PathBuf,
}

impl FileSessionRepository {
    pub async fn new(sessions_dir: impl AsRef<Path>) -> Result<Self> {
        let sessions_dir = sessions_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&sessions_dir).await?;
        Ok(Self { sessions_dir })
    }

    fn session_file_path(&self, session_id: &str) -> Result<PathBuf> {
        // Session ids become file names, so path fragments are rejected.
        if session_id.is_empty()
            || session_id
                .chars()
                .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(ValetError::Execution(format!(
                "Invalid session id '{session_id}'"
            )));
        }
        Ok(self.sessions_dir.join(format!("{session_id}.toml")))
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.session_file_path(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&path).await?;
        let session: Session = toml::from_str(&raw)?;
        Ok(Some(session))
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_file_path(&session.id)?;
        let rendered = toml::to_string_pretty(session)?;
        tokio::fs::write(&path, rendered).await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let path = self.session_file_path(session_id)?;
        if !path.exists() {
            return Err(ValetError::not_found("session", session_id));
        }
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.sessions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            match toml::from_str::<Session>(&raw) {
                Ok(session) => sessions.push(session),
                Err(err) => {
                    tracing::warn!(
                        target: "valet::storage",
                        path = %path.display(),
                        error = %err,
                        "skipping unreadable session file"
                    );
                }
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use valet_core::session::TurnRole;

    async fn repo() -> (tempfile::TempDir, FileSessionRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileSessionRepository::new(dir.path().join("sessions"))
            .await
            .unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let (_dir, repo) = repo().await;
        let mut session = Session::new("s1");
        session.push_turn(TurnRole::User, "rename my file");
        repo.save(&session).await.unwrap();

        let loaded = repo.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(loaded.id, "s1");
        assert_eq!(loaded.turns.len(), 1);
        assert_eq!(loaded.turns[0].content, "rename my file");
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let (_dir, repo) = repo().await;
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, repo) = repo().await;
        let err = repo.delete("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_path_fragment_ids_rejected() {
        let (_dir, repo) = repo().await;
        assert!(repo.find_by_id("../etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_list_all_sorted_most_recent_first() {
        let (_dir, repo) = repo().await;
        let mut older = Session::new("older");
        older.updated_at = "2026-01-01T00:00:00+00:00".to_string();
        let mut newer = Session::new("newer");
        newer.updated_at = "2026-02-01T00:00:00+00:00".to_string();
        repo.save(&older).await.unwrap();
        repo.save(&newer).await.unwrap();

        let all = repo.list_all().await.unwrap();
        assert_eq!(all[0].id, "newer");
        assert_eq!(all[1].id, "older");
    }
}
