//! Application path management
//!
//! - **Dev mode**: a `config.yaml` in the current working directory wins, and
//!   logs go to `./logs`.
//! - **User mode** (default): config and logs live under the per-user config
//!   directory (`~/.config/remote-pointer` on Linux, `%APPDATA%\remote-pointer`
//!   on Windows).

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name under the user's config dir
const APP_NAME: &str = "remote-pointer";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    /// Config found in the working directory
    pub is_dev: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized.
    pub fn detect() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::detect_in(&cwd, dirs::config_dir())
    }

    fn detect_in(cwd: &Path, user_config_dir: Option<PathBuf>) -> Self {
        let cwd_config = cwd.join("config.yaml");
        if cwd_config.exists() {
            return Self {
                config: cwd_config,
                logs_dir: cwd.join("logs"),
                is_dev: true,
            };
        }

        let base = user_config_dir
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: no user config directory, falling back to cwd");
                cwd.to_path_buf()
            })
            .join(APP_NAME);

        Self {
            config: base.join("config.yaml"),
            logs_dir: base.join("logs"),
            is_dev: false,
        }
    }

    /// Paths for an explicit `--config` file; logs go next to it.
    pub fn for_config(config: impl Into<PathBuf>) -> Self {
        let config = config.into();
        let base = config
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            logs_dir: base.join("logs"),
            config,
            is_dev: false,
        }
    }

    /// Config path as the string form the config loader takes
    pub fn config_str(&self) -> String {
        self.config.to_string_lossy().to_string()
    }

    /// Create the logs directory and the config file's parent.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            debug!("Creating logs directory: {}", self.logs_dir.display());
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory {}", self.logs_dir.display())
            })?;
        }

        if let Some(parent) = self.config.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                debug!("Creating config directory: {}", parent.display());
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }

        Ok(())
    }
}
