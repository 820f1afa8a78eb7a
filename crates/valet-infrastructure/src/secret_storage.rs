//! Secret storage for API keys.
//!
//! Secrets live in secret.json under the config directory. A missing file
//! is fine: backends fall back to provider environment variables.

use crate::paths::ValetPaths;
use std::path::PathBuf;
use tracing::debug;
use valet_core::config::SecretConfig;
use valet_core::Result;

pub struct SecretStorage {
    secret_path: PathBuf,
}

impl SecretStorage {
    pub fn new(paths: &ValetPaths) -> Self {
        Self {
            secret_path: paths.secret_file(),
        }
    }

    /// Loads secrets, or an empty config when the file does not exist.
    pub async fn load(&self) -> Result<SecretConfig> {
        if !self.secret_path.exists() {
            debug!(
                target: "valet::config",
                path = %self.secret_path.display(),
                "no secret file, relying on environment variables"
            );
            return Ok(SecretConfig::default());
        }
        let raw = tokio::fs::read_to_string(&self.secret_path).await?;
        let secrets: SecretConfig = serde_json::from_str(&raw)?;
        Ok(secrets)
    }

    /// Writes the secret file with owner-only permissions.
    pub async fn save(&self, secrets: &SecretConfig) -> Result<()> {
        if let Some(parent) = self.secret_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rendered = serde_json::to_string_pretty(secrets)?;
        tokio::fs::write(&self.secret_path, rendered).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.secret_path, perms).await?;
        }
        Ok(())
    }
}
