//! TOML file-backed user profile repository.

use async_trait::async_trait;
use std::path::PathBuf;
use valet_core::profile::{ProfileRepository, UserProfile};
use valet_core::Result;

pub struct FileProfileRepository {
    profile_path: PathBuf,
}

impl FileProfileRepository {
    pub fn new(profile_path: impl Into<PathBuf>) -> Self {
        Self {
            profile_path: profile_path.into(),
        }
    }
}

#[async_trait]
impl ProfileRepository for FileProfileRepository {
    async fn load(&self) -> Result<Option<UserProfile>> {
        if !self.profile_path.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.profile_path).await?;
        let profile: UserProfile = toml::from_str(&raw)?;
        Ok(Some(profile))
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        if let Some(parent) = self.profile_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rendered = toml::to_string_pretty(profile)?;
        tokio::fs::write(&self.profile_path, rendered).await?;
        Ok(())
    }
}
