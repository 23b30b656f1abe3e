//! Tally transport sinks
//!
//! A sink takes an encoded OSC message and puts it on the wire. Sends are
//! fire-and-forget from the engine's point of view: the pacer logs failures
//! and moves on, a later state change re-asserts the correct lights.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info};

use crate::osc::OscMessage;

/// Destination for tally messages
///
/// Note: `send` takes `&self` so a sink can be shared as `Arc<dyn TallySink>`.
#[async_trait]
pub trait TallySink: Send + Sync {
    /// Sink name used in logs (e.g. "udp", "log")
    fn name(&self) -> &str;

    /// Send one message
    async fn send(&self, msg: &OscMessage) -> Result<()>;
}

/// Sends OSC datagrams to the tally receiver
pub struct UdpTallySink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTallySink {
    /// Bind the local socket and resolve the receiver address
    pub async fn bind(local: &str, host: &str, port: u16) -> Result<Self> {
        let target = lookup_host((host, port))
            .await
            .with_context(|| format!("Failed to resolve tally receiver {}:{}", host, port))?
            .next()
            .with_context(|| format!("No address found for tally receiver {}:{}", host, port))?;

        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {}", local))?;

        info!(
            "📡 Tally transport ready: {} -> {}",
            socket.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| local.to_string()),
            target
        );

        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl TallySink for UdpTallySink {
    fn name(&self) -> &str {
        "udp"
    }

    async fn send(&self, msg: &OscMessage) -> Result<()> {
        let payload = msg.encode()?;
        self.socket
            .send_to(&payload, self.target)
            .await
            .with_context(|| format!("Failed to send '{}' to {}", msg.address, self.target))?;
        debug!("📤 {} -> {}", msg, self.target);
        Ok(())
    }
}

/// Logs messages instead of sending them (dry runs, replays)
#[derive(Default)]
pub struct LogSink {
    sent: AtomicU64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages logged so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TallySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, msg: &OscMessage) -> Result<()> {
        // Encode anyway so dry runs catch bad addresses
        msg.encode()?;
        let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        info!("💡 [dry-run #{}] {}", n, msg);
        Ok(())
    }
}

/// Records messages in memory for assertions
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemorySink {
    messages: std::sync::Mutex<Vec<(tokio::time::Instant, OscMessage)>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemorySink {
    pub(crate) fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Make every subsequent send fail
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn messages(&self) -> Vec<OscMessage> {
        self.messages.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub(crate) fn timed(&self) -> Vec<(tokio::time::Instant, OscMessage)> {
        self.messages.lock().unwrap().clone()
    }

    /// Messages rendered as "address=1" / "address=0"
    pub(crate) fn lines(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| match m.args.first() {
                Some(crate::osc::OscArg::Float(v)) => format!("{}={}", m.address, v),
                _ => m.address.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
#[async_trait]
impl TallySink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, msg: &OscMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("simulated send failure");
        }
        self.messages
            .lock()
            .unwrap()
            .push((tokio::time::Instant::now(), msg.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_sink_delivers_datagram() -> Result<()> {
        let receiver = UdpSocket::bind("127.0.0.1:0").await?;
        let port = receiver.local_addr()?.port();

        let sink = UdpTallySink::bind("127.0.0.1:0", "127.0.0.1", port).await?;
        assert_eq!(sink.target().port(), port);
        sink.send(&OscMessage::tally("/exec/1/4", true)).await?;

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receiver.recv_from(&mut buf),
        )
        .await??;
        assert_eq!(
            OscMessage::decode(&buf[..len])?,
            OscMessage::tally("/exec/1/4", true)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_log_sink_counts_and_validates() {
        let sink = LogSink::new();
        sink.send(&OscMessage::tally("/exec/1/1", false)).await.unwrap();
        assert_eq!(sink.sent(), 1);
        assert!(sink.send(&OscMessage::tally("no-slash", true)).await.is_err());
        assert_eq!(sink.sent(), 1);
    }
}
