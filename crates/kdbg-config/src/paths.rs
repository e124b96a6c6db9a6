use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Standard per-user directories for kdbg.
#[derive(Debug, Clone)]
pub struct KdbgPaths {
    home: PathBuf,
}

impl KdbgPaths {
    /// Resolve the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] if it cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir()
            .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(Self { home })
    }

    /// Paths rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    /// `~/.config/kdbg`
    pub fn config_dir(&self) -> PathBuf {
        self.home.join(".config").join("kdbg")
    }

    /// `~/.local/share/kdbg`
    pub fn data_dir(&self) -> PathBuf {
        self.home.join(".local").join("share").join("kdbg")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    pub fn default_log_file(&self) -> PathBuf {
        self.log_dir().join("kdbg.log")
    }
}
