//! Command enum for the tally actor
//!
//! Change batches and lifecycle notifications are fire-and-forget; queries
//! answer through a oneshot channel.

use tokio::sync::oneshot;

use super::dispatcher::DispatchSettings;
use super::types::OnAirSet;
use crate::switcher::SwitcherState;

/// Commands for the tally actor
///
/// Commands are processed one at a time in arrival order, so batches are
/// never interleaved or reordered.
#[derive(Debug)]
pub enum ActorCommand {
    // -------------------------------------------------------------------------
    // Switcher lifecycle (fire and forget)
    // -------------------------------------------------------------------------
    /// Full snapshot after (re)connect: reset lights and rebuild the engine
    Reconcile { state: Box<SwitcherState> },

    /// Incremental change batch
    ApplyChanges {
        state: Box<SwitcherState>,
        paths: Vec<String>,
    },

    /// Connection to the switcher was lost; keep the current set until the
    /// next reconcile
    SwitcherLost,

    /// New dispatch settings (hot config reload)
    Reconfigure { settings: DispatchSettings },

    // -------------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------------
    /// Current on-air set
    GetOnAir { response: oneshot::Sender<OnAirSet> },

    /// Respond once every command queued so far has reached the transport
    Flush { response: oneshot::Sender<()> },

    /// Stop the actor (and its pacer)
    Shutdown,
}
