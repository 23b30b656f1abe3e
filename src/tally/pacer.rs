//! Outbound pacing queue
//!
//! Tally receivers drop packets when hit too fast, so consecutive messages
//! are spaced by a minimum interval. The spacing happens in a dedicated
//! task draining a FIFO queue on a timer: enqueueing never waits, so the
//! engine keeps accepting change batches while earlier commands are still
//! trickling out.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::osc::OscMessage;
use crate::transport::TallySink;

/// Commands for the pacer task
#[derive(Debug)]
pub enum PacerCommand {
    /// Queue a message for sending
    Send(OscMessage),
    /// Change the spacing between messages (zero disables pacing)
    SetSpacing(Duration),
    /// Respond once everything queued before this command has been sent
    Flush(oneshot::Sender<()>),
    /// Stop after sending what is already queued
    Shutdown,
}

/// Handle for queueing outbound messages
#[derive(Clone)]
pub struct PacerHandle {
    cmd_tx: mpsc::UnboundedSender<PacerCommand>,
}

impl PacerHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<PacerCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Queue a message (fire-and-forget)
    pub fn enqueue(&self, msg: OscMessage) {
        if self.cmd_tx.send(PacerCommand::Send(msg)).is_err() {
            warn!("Pacer stopped, dropping outbound tally message");
        }
    }

    pub fn set_spacing(&self, spacing: Duration) {
        let _ = self.cmd_tx.send(PacerCommand::SetSpacing(spacing));
    }

    /// Wait until every message queued so far has been handed to the sink
    pub async fn flush(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self.cmd_tx.send(PacerCommand::Flush(response_tx)).is_err() {
            return;
        }
        let _ = response_rx.await;
    }

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(PacerCommand::Shutdown);
    }
}

/// Task draining the queue into a sink
pub struct Pacer {
    sink: Arc<dyn TallySink>,
    ticker: Option<Interval>,
    last_sent: Option<Instant>,
    command_rx: mpsc::UnboundedReceiver<PacerCommand>,
    sent: u64,
    failed: u64,
}

impl Pacer {
    /// Spawn the pacer task and return a handle
    pub fn spawn(sink: Arc<dyn TallySink>, spacing: Duration) -> PacerHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let pacer = Pacer {
            sink,
            ticker: make_ticker(spacing, None),
            last_sent: None,
            command_rx: cmd_rx,
            sent: 0,
            failed: 0,
        };

        info!(
            "Pacer spawned (sink: {}, spacing: {}ms)",
            pacer.sink.name(),
            spacing.as_millis()
        );
        tokio::spawn(pacer.run());

        PacerHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                PacerCommand::Send(msg) => self.send(msg).await,
                PacerCommand::SetSpacing(spacing) => {
                    debug!("Pacer spacing set to {}ms", spacing.as_millis());
                    self.ticker = make_ticker(spacing, self.last_sent);
                }
                PacerCommand::Flush(response) => {
                    let _ = response.send(());
                }
                PacerCommand::Shutdown => break,
            }
        }

        info!(
            sent = self.sent,
            failed = self.failed,
            "Pacer stopped"
        );
    }

    async fn send(&mut self, msg: OscMessage) {
        // First tick completes immediately, later ones keep the spacing
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }

        self.last_sent = Some(Instant::now());
        match self.sink.send(&msg).await {
            Ok(()) => self.sent += 1,
            Err(e) => {
                self.failed += 1;
                warn!("Failed to send tally message {}: {:#}", msg, e);
            }
        }
    }
}

/// Ticker whose first tick keeps `spacing` after the previous send
fn make_ticker(spacing: Duration, last_sent: Option<Instant>) -> Option<Interval> {
    if spacing.is_zero() {
        return None;
    }
    let start = last_sent
        .map(|t| t + spacing)
        .filter(|t| *t > Instant::now())
        .unwrap_or_else(Instant::now);
    let mut ticker = interval_at(start, spacing);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}
