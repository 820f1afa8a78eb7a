//! Persistence trait for sessions.

use super::model::Session;
use crate::error::Result;
use async_trait::async_trait;

/// Storage backend for session data.
///
/// The core only appends turns and reads trailing windows; implementations
/// own the on-disk format.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_by_id(&self, session_id: &str) -> Result<Option<Session>>;

    async fn save(&self, session: &Session) -> Result<()>;

    async fn delete(&self, session_id: &str) -> Result<()>;

    /// All sessions, most recently updated first.
    async fn list_all(&self) -> Result<Vec<Session>>;
}
