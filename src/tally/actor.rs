//! TallyActor - sequential owner of the tally engine
//!
//! The engine and dispatcher state (on-air set, transition bookkeeping, lit
//! addresses) are owned by a single task. Every change batch, reconcile and
//! reconfiguration arrives as a command and is processed to completion before
//! the next one, which gives:
//! - strict arrival ordering of batches
//! - no locks around engine state
//! - intake that never waits on outbound pacing (the pacer has its own task)

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::actor_handle::TallyActorHandle;
use super::classifier::classify_batch;
use super::commands::ActorCommand;
use super::dispatcher::{DispatchSettings, TallyDispatcher};
use super::engine::TallyEngine;
use super::pacer::PacerHandle;
use super::reconciler::reconcile;
use crate::switcher::SwitcherState;

/// Actor owning the engine and dispatcher
///
/// # Lifecycle
///
/// ```text
///   spawn ──► unsynced ──Reconcile──► synced ──SwitcherLost──► unsynced
///                 │                     │
///           batches dropped       batches applied
/// ```
pub struct TallyActor {
    engine: TallyEngine,
    dispatcher: TallyDispatcher,
    reset_range: u16,

    /// Incremental batches are only meaningful on top of a reconciled baseline
    synced: bool,

    /// Switcher state of the last processed batch, replayed when settings change
    last_snapshot: Option<Box<SwitcherState>>,

    command_rx: mpsc::UnboundedReceiver<ActorCommand>,

    batch_count: u64,
}

impl TallyActor {
    /// Spawn a new TallyActor and return a handle for interacting with it
    pub fn spawn(settings: DispatchSettings, outbound: PacerHandle) -> TallyActorHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        outbound.set_spacing(settings.spacing);

        let actor = TallyActor {
            engine: TallyEngine::new(),
            dispatcher: TallyDispatcher::new(settings.template, outbound),
            reset_range: settings.reset_range,
            synced: false,
            last_snapshot: None,
            command_rx: cmd_rx,
            batch_count: 0,
        };

        tokio::spawn(actor.run());

        info!("TallyActor spawned");

        TallyActorHandle::new(cmd_tx)
    }

    async fn run(mut self) {
        debug!("TallyActor run loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            trace!(?cmd, "Processing command");

            match cmd {
                ActorCommand::Reconcile { state } => {
                    self.handle_reconcile(state);
                }
                ActorCommand::ApplyChanges { state, paths } => {
                    self.handle_apply_changes(state, &paths);
                }
                ActorCommand::SwitcherLost => {
                    if self.synced {
                        warn!(
                            on_air = self.engine.on_air().len(),
                            "Switcher connection lost, holding tally state until resync"
                        );
                    }
                    self.synced = false;
                }
                ActorCommand::Reconfigure { settings } => {
                    self.handle_reconfigure(settings);
                }
                ActorCommand::GetOnAir { response } => {
                    let _ = response.send(self.engine.on_air().clone());
                }
                ActorCommand::Flush { response } => {
                    self.dispatcher.outbound().flush().await;
                    let _ = response.send(());
                }
                ActorCommand::Shutdown => {
                    info!("TallyActor received shutdown command");
                    self.dispatcher.outbound().flush().await;
                    self.dispatcher.outbound().shutdown();
                    break;
                }
            }
        }

        info!(batches = self.batch_count, "TallyActor stopped");
    }

    fn handle_reconcile(&mut self, state: Box<SwitcherState>) {
        reconcile(
            &mut self.engine,
            &mut self.dispatcher,
            &state,
            self.reset_range,
        );
        self.synced = true;
        self.last_snapshot = Some(state);
    }

    fn handle_apply_changes(&mut self, state: Box<SwitcherState>, paths: &[String]) {
        if !self.synced {
            warn!(
                paths = paths.len(),
                "Dropping change batch received before reconciliation"
            );
            return;
        }

        self.batch_count += 1;
        let events = classify_batch(paths, &state);
        // Every batch carries the full state; a later re-reconcile starts here
        self.last_snapshot = Some(state);
        if events.is_empty() {
            return;
        }

        let delta = self.engine.apply(&events);
        let queued = self.dispatcher.dispatch(&delta);
        if queued > 0 {
            debug!(
                batch = self.batch_count,
                events = events.len(),
                queued,
                "Change batch dispatched"
            );
        }
    }

    fn handle_reconfigure(&mut self, settings: DispatchSettings) {
        info!(
            strict = settings.template.is_strict(),
            spacing_ms = settings.spacing.as_millis() as u64,
            reset_range = settings.reset_range,
            "Applying new tally settings"
        );

        self.dispatcher.outbound().set_spacing(settings.spacing);
        self.dispatcher.set_template(settings.template);
        self.reset_range = settings.reset_range;

        // Lights were addressed under the old settings
        match (&self.last_snapshot, self.synced) {
            (Some(snapshot), true) => {
                let snapshot = snapshot.clone();
                self.handle_reconcile(snapshot);
            }
            _ => debug!("No synced snapshot, settings apply from the next reconcile"),
        }
    }
}
