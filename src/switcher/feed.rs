//! Switcher state feed
//!
//! The switcher protocol itself is handled by a bridge process that forwards
//! library events as JSON lines:
//!
//! ```text
//! {"type":"connected","state":{...}}
//! {"type":"stateChanged","state":{...},"paths":["video.ME.0.programInput"]}
//! {"type":"disconnected"}
//! ```
//!
//! The same format is used for replay files.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use super::SwitcherState;

/// One line of the feed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeedMessage {
    Connected {
        state: SwitcherState,
    },
    StateChanged {
        state: SwitcherState,
        #[serde(default)]
        paths: Vec<String>,
    },
    Disconnected,
}

/// Switcher lifecycle as seen by the tally engine
#[derive(Debug, Clone, PartialEq)]
pub enum SwitcherEvent {
    /// Connected (or reconnected) with a full snapshot
    Connected(Box<SwitcherState>),
    /// State changed; `paths` name what changed, `state` is the full new state
    Changed {
        state: Box<SwitcherState>,
        paths: Vec<String>,
    },
    Disconnected,
}

impl From<FeedMessage> for SwitcherEvent {
    fn from(msg: FeedMessage) -> Self {
        match msg {
            FeedMessage::Connected { state } => SwitcherEvent::Connected(Box::new(state)),
            FeedMessage::StateChanged { state, paths } => SwitcherEvent::Changed {
                state: Box::new(state),
                paths,
            },
            FeedMessage::Disconnected => SwitcherEvent::Disconnected,
        }
    }
}

/// Forward every line of `reader` as a [`SwitcherEvent`] until EOF
///
/// Blank lines are skipped. Lines that fail to parse are logged and skipped.
/// Returns the number of events forwarded; errors only on I/O failure or when
/// the receiver is gone.
pub async fn pump_lines<R>(reader: R, tx: &mpsc::Sender<SwitcherEvent>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut forwarded = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read switcher feed")? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: FeedMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Skipping malformed feed line {}: {}", line_no, e);
                continue;
            }
        };
        trace!(line_no, "Feed message parsed");

        tx.send(msg.into())
            .await
            .context("Switcher event receiver closed")?;
        forwarded += 1;
    }

    Ok(forwarded)
}

/// Read a recorded feed from disk
pub async fn replay_file(path: &std::path::Path, tx: &mpsc::Sender<SwitcherEvent>) -> Result<usize> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open replay file {}", path.display()))?;

    info!("⏪ Replaying switcher feed from {}", path.display());
    let count = pump_lines(BufReader::new(file), tx).await?;
    info!("Replay finished ({} events)", count);
    Ok(count)
}

/// TCP client for the bridge feed with automatic reconnection
#[derive(Debug, Clone)]
pub struct FeedClient {
    addr: String,
    reconnect: Duration,
}

impl FeedClient {
    pub fn new(host: &str, port: u16, reconnect: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            reconnect,
        }
    }

    /// Run the connect/read loop in the background
    ///
    /// A `Disconnected` event is emitted whenever an established connection
    /// drops. The loop ends when the receiver is dropped.
    pub fn spawn(self, tx: mpsc::Sender<SwitcherEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut attempt: u32 = 0;

            loop {
                match TcpStream::connect(&self.addr).await {
                    Ok(stream) => {
                        info!("🔌 Connected to switcher feed at {}", self.addr);
                        attempt = 0;

                        match pump_lines(BufReader::new(stream), &tx).await {
                            Ok(count) => info!("Switcher feed closed after {} events", count),
                            Err(e) => warn!("Switcher feed error: {:#}", e),
                        }

                        if tx.send(SwitcherEvent::Disconnected).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        attempt += 1;
                        debug!("Switcher feed connect #{} to {} failed: {}", attempt, self.addr, e);
                        if attempt == 1 {
                            warn!("⚠️ Switcher feed at {} unreachable, retrying", self.addr);
                        }
                    }
                }

                if tx.is_closed() {
                    break;
                }
                sleep(self.reconnect).await;
            }

            debug!("Switcher feed client stopped");
        })
    }
}
