//! Configuration management for Tally GW
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::tally::{AddressTemplate, DispatchSettings};

pub use watcher::ConfigWatcher;

/// Upper bound for the reset sweep (one message per light, paced)
pub const MAX_RESET_RANGE: u16 = 64;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub switcher: SwitcherConfig,
    #[serde(default)]
    pub tally: TallyConfig,
}

/// Where the switcher state feed comes from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SwitcherConfig {
    #[serde(default = "default_switcher_host")]
    pub host: String,
    #[serde(default = "default_switcher_port")]
    pub port: u16,
    /// Delay between reconnection attempts
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,
}

/// Tally receiver and dispatch behavior
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TallyConfig {
    #[serde(default = "default_tally_host")]
    pub host: String,
    #[serde(default = "default_tally_port")]
    pub port: u16,
    /// Local UDP bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// OSC address with `{source}` (and `{bus}` in strict mode) placeholders
    #[serde(default = "default_address_template")]
    pub address_template: String,
    /// Address lights per bus instead of per source
    #[serde(default)]
    pub strict_me: bool,
    /// Minimum gap between outbound messages (0 disables pacing)
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// Source ids 1..=reset_range are switched off on every (re)connect
    #[serde(default = "default_reset_range")]
    pub reset_range: u16,
}

impl Default for SwitcherConfig {
    fn default() -> Self {
        Self {
            host: default_switcher_host(),
            port: default_switcher_port(),
            reconnect_ms: default_reconnect_ms(),
        }
    }
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            host: default_tally_host(),
            port: default_tally_port(),
            bind: default_bind(),
            address_template: default_address_template(),
            strict_me: false,
            pacing_ms: default_pacing_ms(),
            reset_range: default_reset_range(),
        }
    }
}

impl SwitcherConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

impl TallyConfig {
    /// Build validated dispatcher settings
    pub fn dispatch_settings(&self) -> Result<DispatchSettings> {
        let template = AddressTemplate::parse(&self.address_template, self.strict_me)
            .context("Invalid tally.address_template")?;

        Ok(DispatchSettings {
            template,
            spacing: Duration::from_millis(self.pacing_ms),
            reset_range: self.reset_range,
        })
    }

    /// Whether switching to `other` needs a new socket
    pub fn endpoint_changed(&self, other: &TallyConfig) -> bool {
        self.host != other.host || self.port != other.port || self.bind != other.bind
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.switcher.host.trim().is_empty() {
            anyhow::bail!("switcher.host cannot be empty");
        }
        if self.switcher.port == 0 {
            anyhow::bail!("switcher.port cannot be 0");
        }

        if self.tally.host.trim().is_empty() {
            anyhow::bail!("tally.host cannot be empty");
        }
        if self.tally.port == 0 {
            anyhow::bail!("tally.port cannot be 0");
        }
        if self.tally.bind.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!(
                "tally.bind '{}' is not a socket address (e.g. 0.0.0.0:57121)",
                self.tally.bind
            );
        }
        if self.tally.reset_range > MAX_RESET_RANGE {
            anyhow::bail!(
                "tally.reset_range {} is too large (must be 0-{})",
                self.tally.reset_range,
                MAX_RESET_RANGE
            );
        }

        self.tally.dispatch_settings()?;

        Ok(())
    }

    /// Whether moving to `other` touches settings that only apply on restart
    pub fn restart_required(&self, other: &AppConfig) -> bool {
        self.switcher != other.switcher || self.tally.endpoint_changed(&other.tally)
    }
}

// Default value functions
fn default_switcher_host() -> String { "192.168.1.240".to_string() }
fn default_switcher_port() -> u16 { 9910 }
fn default_reconnect_ms() -> u64 { 2000 }
fn default_tally_host() -> String { "192.168.1.10".to_string() }
fn default_tally_port() -> u16 { 8000 }
fn default_bind() -> String { "0.0.0.0:57121".to_string() }
fn default_address_template() -> String { "/exec/1/{source}".to_string() }
fn default_pacing_ms() -> u64 { 200 }
fn default_reset_range() -> u16 { 8 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.tally.port, 8000);
        assert_eq!(config.tally.bind, "0.0.0.0:57121");
        assert_eq!(config.switcher.reconnect_delay(), Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_dispatch_settings() {
        let config: AppConfig = serde_yaml::from_str(
            r#"
tally:
  address_template: "/tally/{bus}/{source}"
  strict_me: true
  pacing_ms: 0
  reset_range: 16
"#,
        )
        .unwrap();

        let settings = config.tally.dispatch_settings().unwrap();
        assert!(settings.template.is_strict());
        assert_eq!(settings.spacing, Duration::ZERO);
        assert_eq!(settings.reset_range, 16);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.tally.strict_me = true;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("{bus}"));

        let mut config = AppConfig::default();
        config.tally.reset_range = 500;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.switcher.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.tally.bind = "57121".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restart_required() {
        let base = AppConfig::default();

        let mut hot = base.clone();
        hot.tally.pacing_ms = 50;
        hot.tally.strict_me = true;
        assert!(!base.restart_required(&hot));

        let mut cold = base.clone();
        cold.tally.port = 9000;
        assert!(base.restart_required(&cold));
    }

    #[tokio::test]
    async fn test_load_serialized_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::default();
        config.tally.host = "10.0.0.5".to_string();
        std::fs::write(&path, serde_yaml::to_string(&config)?)?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "tally:\n  address_template: \"exec/{source}\"\n").unwrap();

        assert!(AppConfig::load(&path.to_string_lossy()).await.is_err());
    }
}
