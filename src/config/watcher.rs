//! Configuration file watcher for hot-reload support
//!
//! Only the dispatch settings of the tally section are applied live; the
//! caller compares endpoints with [`AppConfig::restart_required`].

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Time given to editors to finish writing before the file is re-read
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Config watcher that monitors file changes and sends reload notifications
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Create a new config watcher for the specified file
    ///
    /// The parent directory is watched so that editors replacing the file
    /// (write to temp + rename) are noticed too.
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let (tx, rx) = mpsc::channel(10);

        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        let file = PathBuf::from(&config_path);
        let file_name = file.file_name().map(|n| n.to_os_string());
        let dir = match file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        // notify callbacks run on their own OS thread, not in Tokio context
        let (dirty_tx, dirty_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours {
                        debug!("Config file changed: {:?}", event.paths);
                        let _ = dirty_tx.send(());
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                }
            }
        })?;

        watcher
            .watch(Path::new(&dir), RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", dir.display()))?;

        tokio::spawn(reload_loop(
            config_path.clone(),
            (*initial_config).clone(),
            dirty_rx,
            tx,
        ));

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial_config,
        ))
    }

    /// Wait for the next config update
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}

/// Coalesce change notifications and forward configs that actually differ
async fn reload_loop(
    config_path: String,
    mut current: AppConfig,
    mut dirty_rx: mpsc::UnboundedReceiver<()>,
    tx: mpsc::Sender<AppConfig>,
) {
    while dirty_rx.recv().await.is_some() {
        tokio::time::sleep(DEBOUNCE).await;
        while dirty_rx.try_recv().is_ok() {}

        match AppConfig::load(&config_path).await {
            Ok(new_config) if new_config == current => {
                debug!("Config file touched without changes");
            }
            Ok(new_config) => {
                info!("🔄 Configuration reloaded");
                current = new_config.clone();
                if let Err(e) = tx.send(new_config).await {
                    error!("Failed to send config update: {}", e);
                    break;
                }
            }
            Err(e) => {
                warn!("Failed to reload config (keeping old config): {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_watcher_basic() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("test-config.yaml");

        let initial_config = r#"
switcher:
  host: "10.0.0.2"

tally:
  host: "10.0.0.3"
  pacing_ms: 200
"#;

        fs::write(&config_path, initial_config)?;

        let (mut watcher, config) =
            ConfigWatcher::new(config_path.to_string_lossy().to_string()).await?;

        assert_eq!(config.switcher.host, "10.0.0.2");
        assert_eq!(config.tally.pacing_ms, 200);

        let modified_config = r#"
switcher:
  host: "10.0.0.2"

tally:
  host: "10.0.0.3"
  pacing_ms: 50
  strict_me: true
  address_template: "/tally/{bus}/{source}"
"#;

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(&config_path, modified_config)?;

        let new_config = tokio::time::timeout(Duration::from_secs(2), watcher.next_config()).await?;

        if let Some(new_config) = new_config {
            assert_eq!(new_config.tally.pacing_ms, 50);
            assert!(new_config.tally.strict_me);
            assert!(!config.restart_required(&new_config));
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_initial_config_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.yaml");
        fs::write(&config_path, "tally:\n  strict_me: true\n").unwrap();

        let result = ConfigWatcher::new(config_path.to_string_lossy().to_string()).await;
        assert!(result.is_err());
    }
}
