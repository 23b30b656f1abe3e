//! TallyActorHandle - Public API for the TallyActor
//!
//! Fire-and-forget methods for the switcher event path, async methods with
//! oneshot channels for queries.

use tokio::sync::{mpsc, oneshot};

use super::commands::ActorCommand;
use super::dispatcher::DispatchSettings;
use super::types::OnAirSet;
use crate::switcher::SwitcherState;

/// Handle for interacting with the TallyActor
///
/// # Switcher path (fire-and-forget)
/// - `reconcile` - full snapshot after (re)connect
/// - `apply_changes` - incremental change batch
/// - `switcher_lost` - connection dropped
///
/// # Queries (async with response)
/// - `on_air` - current on-air set
/// - `flush` - wait until queued commands reached the transport
#[derive(Clone)]
pub struct TallyActorHandle {
    cmd_tx: mpsc::UnboundedSender<ActorCommand>,
}

impl TallyActorHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<ActorCommand>) -> Self {
        Self { cmd_tx }
    }

    // =========================================================================
    // Switcher path
    // =========================================================================

    pub fn reconcile(&self, state: SwitcherState) {
        let _ = self.cmd_tx.send(ActorCommand::Reconcile {
            state: Box::new(state),
        });
    }

    pub fn apply_changes(&self, state: SwitcherState, paths: Vec<String>) {
        let _ = self.cmd_tx.send(ActorCommand::ApplyChanges {
            state: Box::new(state),
            paths,
        });
    }

    pub fn switcher_lost(&self) {
        let _ = self.cmd_tx.send(ActorCommand::SwitcherLost);
    }

    pub fn reconfigure(&self, settings: DispatchSettings) {
        let _ = self.cmd_tx.send(ActorCommand::Reconfigure { settings });
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current on-air set (empty if the actor is gone)
    pub async fn on_air(&self) -> OnAirSet {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::GetOnAir {
                response: response_tx,
            })
            .is_err()
        {
            return OnAirSet::new();
        }

        response_rx.await.unwrap_or_default()
    }

    /// Wait until everything queued so far has been handed to the transport
    pub async fn flush(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ActorCommand::Flush {
                response: response_tx,
            })
            .is_err()
        {
            return;
        }
        let _ = response_rx.await;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Drain pending output, then stop the actor and its pacer
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(ActorCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<TallyActorHandle>();
    }

    #[tokio::test]
    async fn test_queries_on_closed_actor_fall_back() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = TallyActorHandle::new(tx);
        assert!(!handle.is_alive());
        assert!(handle.on_air().await.is_empty());
        handle.flush().await;
    }
}
