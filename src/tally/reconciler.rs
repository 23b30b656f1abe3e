//! Startup reconciliation
//!
//! On every (re)connect the lights are forced to a known "off" baseline and
//! the engine is rebuilt from a synthetic batch that touches every program,
//! transition and keyer in the snapshot. The synthetic batch goes through the
//! same classifier/engine/dispatcher path as live updates.

use tracing::info;

use super::classifier::classify_batch;
use super::dispatcher::TallyDispatcher;
use super::engine::TallyEngine;
use super::types::{Bus, OnAirSet};
use crate::switcher::SwitcherState;

/// Every path whose classification reflects on-air state in the snapshot
///
/// Upstream keyers are included for every row.
pub fn startup_paths(state: &SwitcherState) -> Vec<String> {
    let mut paths = Vec::new();

    for i in state.mix_effect_indices() {
        paths.push(format!("video.ME.{}.programInput", i));
        paths.push(format!("video.ME.{}.transitionPosition", i));

        if let Some(me) = state.mix_effect(i) {
            for (k, usk) in me.upstream_keyers.iter().enumerate() {
                if usk.is_some() {
                    paths.push(format!("video.ME.{}.upstreamKeyers.{}", i, k));
                }
            }
        }
    }

    for i in state.downstream_keyer_indices() {
        paths.push(format!("video.downstreamKeyers.{}", i));
    }

    paths
}

/// Buses present in a snapshot (used for the strict-mode reset sweep)
pub fn snapshot_buses(state: &SwitcherState) -> Vec<Bus> {
    state
        .mix_effect_indices()
        .filter_map(|i| u8::try_from(i).ok().map(Bus::MixEffect))
        .chain(
            state
                .downstream_keyer_indices()
                .filter_map(|i| u8::try_from(i).ok().map(Bus::Downstream)),
        )
        .collect()
}

/// Reset the lights and rebuild the engine from a full snapshot
///
/// Returns the resulting on-air set. Activation commands for it are queued
/// behind the reset sweep.
pub fn reconcile(
    engine: &mut TallyEngine,
    dispatcher: &mut TallyDispatcher,
    state: &SwitcherState,
    reset_range: u16,
) -> OnAirSet {
    dispatcher.reset_sweep(&snapshot_buses(state), reset_range);

    engine.reset();
    let paths = startup_paths(state);
    let events = classify_batch(&paths, state);
    let delta = engine.apply(&events);
    let queued = dispatcher.dispatch(&delta);

    info!(
        paths = paths.len(),
        on_air = engine.on_air().len(),
        queued,
        "✅ Tally state reconciled from snapshot"
    );

    engine.on_air().clone()
}
