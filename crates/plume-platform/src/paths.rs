use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "plume";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("no home directory available")]
    MissingHomeDir,
    #[error("no config directory available")]
    MissingConfigDir,
    #[error("no cache directory available")]
    MissingCacheDir,
    #[error("no data directory available")]
    MissingDataDir,
}

/// Per-user directories the app owns, resolved once at startup.
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl AppPaths {
    /// Resolve application directories for the current platform.
    ///
    /// # Errors
    /// Returns an error when the platform cannot name a required base
    /// directory.
    pub fn new() -> Result<Self, AppPathsError> {
        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::MissingHomeDir)?;
            let support = home.join("Library/Application Support").join(APP_DIR);
            Ok(Self {
                config_dir: support.clone(),
                cache_dir: home.join("Library/Caches").join(APP_DIR),
                data_dir: support,
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            let config_dir = dirs::config_dir()
                .ok_or(AppPathsError::MissingConfigDir)?
                .join(APP_DIR);
            let cache_dir = dirs::cache_dir()
                .ok_or(AppPathsError::MissingCacheDir)?
                .join(APP_DIR);
            let data_dir = dirs::data_dir()
                .ok_or(AppPathsError::MissingDataDir)?
                .join(APP_DIR);
            Ok(Self {
                config_dir,
                cache_dir,
                data_dir,
            })
        }
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    /// Root directory holding installed renderer bundles and the installed
    /// manifest file.
    #[must_use]
    pub fn renderer_root(&self) -> PathBuf {
        self.data_dir.join("hot-update").join("render")
    }

    /// Staging directory for in-flight renderer archive downloads. May be
    /// reused across attempts.
    #[must_use]
    pub fn renderer_staging_dir(&self) -> PathBuf {
        self.cache_dir.join("renderer-staging")
    }

    /// Create every directory this struct names.
    ///
    /// # Errors
    /// Returns the first directory-creation failure.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [&self.config_dir, &self.cache_dir, &self.data_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
