//! Loads and persists the application configuration.

use crate::paths::ValetPaths;
use std::path::PathBuf;
use tracing::info;
use valet_core::config::ValetConfig;
use valet_core::Result;

/// File-backed configuration service.
///
/// A missing config file is not an error: the defaults are used and the
/// file is written out so the user has something to edit.
pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    pub fn new(paths: &ValetPaths) -> Self {
        Self {
            config_path: paths.config_file(),
        }
    }

    /// Uses an explicit config file path instead of the platform default.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Loads the configuration, creating a default file if none exists.
    pub async fn load_or_init(&self) -> Result<ValetConfig> {
        if !self.config_path.exists() {
            let config = ValetConfig::default();
            self.save(&config).await?;
            info!(
                target: "valet::config",
                path = %self.config_path.display(),
                "created default configuration"
            );
            return Ok(config);
        }
        let raw = tokio::fs::read_to_string(&self.config_path).await?;
        let config: ValetConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Loads without creating anything. Used by config validation.
    pub async fn load_strict(&self) -> Result<ValetConfig> {
        let raw = tokio::fs::read_to_string(&self.config_path).await?;
        let config: ValetConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    pub async fn save(&self, config: &ValetConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let rendered = toml::to_string_pretty(config)?;
        tokio::fs::write(&self.config_path, rendered).await?;
        Ok(())
    }
}
