//! Application path resolution for config and logs.
//!
//! ## Lookup order for the config file
//!
//! 1. `--config <path>` on the command line
//! 2. `config.yaml` in the current working directory (development, or a
//!    gateway deployed as a plain folder)
//! 3. `<config dir>/Tally GW/config.yaml` (`~/.config` on Linux,
//!    `%APPDATA%` on Windows)
//!
//! Logs go next to the config file in the first two cases, into the
//! platform's local data directory otherwise.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Application name used for directories in installed mode
const APP_NAME: &str = "Tally GW";

/// Config file name looked up in the working directory
const CONFIG_FILE: &str = "config.yaml";

/// How the config file was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    WorkingDir,
    UserConfigDir,
}

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Path to the logs directory
    pub logs_dir: PathBuf,
    pub source: ConfigSource,
}

impl AppPaths {
    /// Detect paths for this process
    ///
    /// Note: This is called before logging is initialized.
    pub fn detect(explicit: Option<PathBuf>) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_root = dirs::config_dir().unwrap_or_else(|| cwd.clone());
        let data_root = dirs::data_local_dir().unwrap_or_else(|| config_root.clone());

        Self::resolve(explicit, &cwd, &config_root, &data_root)
    }

    /// Pure lookup, used by [`AppPaths::detect`]
    pub fn resolve(
        explicit: Option<PathBuf>,
        cwd: &Path,
        config_root: &Path,
        data_root: &Path,
    ) -> Self {
        if let Some(config) = explicit {
            let logs_dir = config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(cwd)
                .join("logs");
            return Self {
                config,
                logs_dir,
                source: ConfigSource::CommandLine,
            };
        }

        let cwd_config = cwd.join(CONFIG_FILE);
        if cwd_config.exists() {
            return Self {
                config: cwd_config,
                logs_dir: cwd.join("logs"),
                source: ConfigSource::WorkingDir,
            };
        }

        Self {
            config: config_root.join(APP_NAME).join(CONFIG_FILE),
            logs_dir: data_root.join(APP_NAME).join("logs"),
            source: ConfigSource::UserConfigDir,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the config directory exists and seed it from
    /// `config.example.yaml` when no config file is present yet.
    pub fn ensure_config(&self) -> anyhow::Result<()> {
        if self.source != ConfigSource::UserConfigDir || self.config.exists() {
            return Ok(());
        }

        let dir = self.base_dir();
        if !dir.exists() {
            debug!("Creating config directory: {}", dir.display());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        for example in [
            exe_dir.join("config.example.yaml"),
            PathBuf::from("config.example.yaml"),
        ] {
            if example.exists() {
                info!(
                    "Copying example config {} to {}",
                    example.display(),
                    self.config.display()
                );
                std::fs::copy(&example, &self.config).with_context(|| {
                    format!(
                        "Failed to copy example config from {} to {}",
                        example.display(),
                        self.config.display()
                    )
                })?;
                return Ok(());
            }
        }

        info!("No config found, please create {}", self.config.display());
        Ok(())
    }

    /// Ensure the logs directory exists
    pub fn ensure_logs_dir(&self) -> anyhow::Result<()> {
        if !self.logs_dir.exists() {
            std::fs::create_dir_all(&self.logs_dir).with_context(|| {
                format!("Failed to create logs directory {}", self.logs_dir.display())
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join(CONFIG_FILE), "{}").unwrap();

        let paths = AppPaths::resolve(
            Some(PathBuf::from("/etc/tally/site.yaml")),
            cwd.path(),
            Path::new("/home/op/.config"),
            Path::new("/home/op/.local/share"),
        );
        assert_eq!(paths.source, ConfigSource::CommandLine);
        assert_eq!(paths.config, PathBuf::from("/etc/tally/site.yaml"));
        assert_eq!(paths.logs_dir, PathBuf::from("/etc/tally/logs"));
    }

    #[test]
    fn test_working_dir_before_user_dir() {
        let cwd = TempDir::new().unwrap();
        let root = Path::new("/home/op/.config");
        let data = Path::new("/home/op/.local/share");

        let paths = AppPaths::resolve(None, cwd.path(), root, data);
        assert_eq!(paths.source, ConfigSource::UserConfigDir);
        assert_eq!(paths.config, root.join("Tally GW").join("config.yaml"));
        assert_eq!(paths.logs_dir, data.join("Tally GW").join("logs"));

        std::fs::write(cwd.path().join(CONFIG_FILE), "{}").unwrap();
        let paths = AppPaths::resolve(None, cwd.path(), root, data);
        assert_eq!(paths.source, ConfigSource::WorkingDir);
        assert_eq!(paths.logs_dir, cwd.path().join("logs"));
    }

    #[test]
    fn test_relative_explicit_path_logs_in_cwd() {
        let paths = AppPaths::resolve(
            Some(PathBuf::from("site.yaml")),
            Path::new("/srv/tally"),
            Path::new("/unused"),
            Path::new("/unused"),
        );
        assert_eq!(paths.logs_dir, PathBuf::from("/srv/tally/logs"));
    }
}
