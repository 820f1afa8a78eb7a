//! Unified path management for valet configuration files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/valet/             # Config directory
//! ├── config.toml              # Application configuration
//! ├── secret.json              # API keys
//! ├── profile.toml             # User profile
//! ├── memory.jsonl             # Durable facts, one JSON object per line
//! └── sessions/                # One TOML file per session
//! ```

use std::path::PathBuf;
use valet_core::{Result, ValetError};

/// Resolves the valet configuration directory and the files within it.
pub struct ValetPaths {
    config_dir: PathBuf,
}

impl ValetPaths {
    /// Resolves against the platform config directory (XDG on Linux).
    pub fn resolve() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| ValetError::config("Cannot determine config directory"))?;
        Ok(Self {
            config_dir: base.join("valet"),
        })
    }

    /// Roots all paths under an explicit directory. Used in tests.
    pub fn with_base(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn secret_file(&self) -> PathBuf {
        self.config_dir.join("secret.json")
    }

    pub fn profile_file(&self) -> PathBuf {
        self.config_dir.join("profile.toml")
    }

    pub fn memory_file(&self) -> PathBuf {
        self.config_dir.join("memory.jsonl")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.config_dir.join("sessions")
    }
}
