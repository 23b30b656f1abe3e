//! Tally GW
//!
//! Drives OSC tally lights from a video switcher's on-air state.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tally_gw::config::{AppConfig, ConfigWatcher};
use tally_gw::logging::init_logging;
use tally_gw::paths::AppPaths;
use tally_gw::sniffer;
use tally_gw::switcher::{replay_file, FeedClient, SwitcherEvent};
use tally_gw::tally::{Pacer, TallyActor, TallyActorHandle};
use tally_gw::transport::{LogSink, TallySink, UdpTallySink};

/// Tally Gateway - light OSC tally receivers from switcher program/preview/keyer state
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: ./config.yaml, then the user config dir)
    #[arg(short, long, env = "TALLY_GW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write daily rolling log files to this directory
    #[arg(long, env = "TALLY_GW_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Log tally messages instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Replay a recorded switcher feed (JSON lines) instead of connecting
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Print OSC traffic received on a UDP port and exit on Ctrl+C
    #[arg(long, value_name = "PORT")]
    sniff: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    if let Some(port) = args.sniff {
        return sniffer::run_osc_sniffer(port).await;
    }

    info!("Starting Tally GW v{}...", env!("CARGO_PKG_VERSION"));

    let paths = AppPaths::detect(args.config.clone());
    paths.ensure_config()?;
    info!(
        "Configuration file: {} ({:?})",
        paths.config.display(),
        paths.source
    );

    let (config_watcher, initial_config) =
        ConfigWatcher::new(paths.config.to_string_lossy().to_string()).await?;
    info!("Configuration loaded successfully with hot-reload enabled");

    let config = (*initial_config).clone();
    let settings = config.tally.dispatch_settings()?;

    let sink: Arc<dyn TallySink> = if args.dry_run {
        info!("Dry run: tally messages are logged, not sent");
        Arc::new(LogSink::new())
    } else {
        Arc::new(
            UdpTallySink::bind(&config.tally.bind, &config.tally.host, config.tally.port)
                .await
                .context("Failed to set up tally transport")?,
        )
    };

    let pacer = Pacer::spawn(sink, settings.spacing);
    let tally = TallyActor::spawn(settings, pacer);

    let (event_tx, event_rx) = mpsc::channel(256);
    let feed_task = match &args.replay {
        Some(file) => {
            let file = file.clone();
            tokio::spawn(async move {
                if let Err(e) = replay_file(&file, &event_tx).await {
                    warn!("Replay failed: {:#}", e);
                }
            })
        }
        None => FeedClient::new(
            &config.switcher.host,
            config.switcher.port,
            config.switcher.reconnect_delay(),
        )
        .spawn(event_tx),
    };

    run_app(&tally, config, config_watcher, event_rx, shutdown_signal()).await;

    feed_task.abort();
    info!("Draining queued tally messages...");
    tally.flush().await;
    tally.shutdown();

    info!("Tally GW shutdown complete");
    Ok(())
}

async fn run_app(
    tally: &TallyActorHandle,
    mut config: AppConfig,
    mut config_watcher: ConfigWatcher,
    mut events: mpsc::Receiver<SwitcherEvent>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    info!("Ready to process switcher events!");

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    info!("Switcher feed ended");
                    break;
                };
                match event {
                    SwitcherEvent::Connected(state) => {
                        info!("🎬 Switcher connected, reconciling tally lights");
                        tally.reconcile(*state);
                    }
                    SwitcherEvent::Changed { state, paths } => {
                        debug!(paths = paths.len(), "Switcher state changed");
                        tally.apply_changes(*state, paths);
                    }
                    SwitcherEvent::Disconnected => {
                        warn!("⚠️  Switcher disconnected");
                        tally.switcher_lost();
                    }
                }
            }

            Some(new_config) = config_watcher.next_config() => {
                info!("📝 Configuration file changed, reloading...");
                apply_config(tally, &config, &new_config);
                config = new_config;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }
}

/// Hot-apply what can change at runtime
fn apply_config(tally: &TallyActorHandle, current: &AppConfig, new_config: &AppConfig) {
    if current.restart_required(new_config) {
        warn!("⚠️  Switcher or tally endpoint changed: restart required to apply");
    }

    if current.tally == new_config.tally {
        return;
    }

    match new_config.tally.dispatch_settings() {
        Ok(settings) => {
            tally.reconfigure(settings);
            info!("✅ Tally settings applied");
        }
        Err(e) => warn!("⚠️  Failed to apply tally settings (keeping old ones): {:#}", e),
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
}
