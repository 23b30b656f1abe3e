//! Switcher state snapshot
//!
//! Mirrors the part of the switcher library's state tree that matters for
//! tally: program/preview routing, transition progress and keyer on-air flags.
//! Field names follow the library's camelCase JSON so snapshots can be
//! forwarded verbatim by a bridge process.

pub mod feed;

use serde::{Deserialize, Serialize};

use crate::tally::SourceId;

pub use feed::{pump_lines, replay_file, FeedClient, FeedMessage, SwitcherEvent};

/// Root switcher state
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SwitcherState {
    #[serde(default)]
    pub video: VideoState,
}

/// Video section of the state tree
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    /// Rows can be sparse (`null`) in the library's representation
    #[serde(default)]
    pub mix_effects: Vec<Option<MixEffect>>,
    #[serde(default)]
    pub downstream_keyers: Vec<Option<DownstreamKeyer>>,
}

/// One mix-effect row
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MixEffect {
    pub program_input: SourceId,
    pub preview_input: SourceId,
    #[serde(default)]
    pub transition_position: TransitionPosition,
    #[serde(default)]
    pub upstream_keyers: Vec<Option<UpstreamKeyer>>,
}

/// Transition progress of a row
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPosition {
    #[serde(default)]
    pub in_transition: bool,
    /// 0 = idle/complete, up to 10000 at the end of the lever
    #[serde(default)]
    pub handle_position: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamKeyer {
    #[serde(default)]
    pub on_air: bool,
    pub fill_source: SourceId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamKeyer {
    #[serde(default)]
    pub on_air: bool,
    pub sources: DownstreamKeyerSources,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamKeyerSources {
    pub fill_source: SourceId,
    #[serde(default)]
    pub cut_source: SourceId,
}

impl SwitcherState {
    /// Get a mix-effect row, skipping sparse entries
    pub fn mix_effect(&self, index: usize) -> Option<&MixEffect> {
        self.video.mix_effects.get(index).and_then(Option::as_ref)
    }

    /// Get a downstream keyer, skipping sparse entries
    pub fn downstream_keyer(&self, index: usize) -> Option<&DownstreamKeyer> {
        self.video.downstream_keyers.get(index).and_then(Option::as_ref)
    }

    /// Indices of the mix-effect rows present in the snapshot
    pub fn mix_effect_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.video
            .mix_effects
            .iter()
            .enumerate()
            .filter_map(|(i, me)| me.as_ref().map(|_| i))
    }

    /// Indices of the downstream keyers present in the snapshot
    pub fn downstream_keyer_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.video
            .downstream_keyers
            .iter()
            .enumerate()
            .filter_map(|(i, dsk)| dsk.as_ref().map(|_| i))
    }
}

impl MixEffect {
    pub fn upstream_keyer(&self, index: usize) -> Option<&UpstreamKeyer> {
        self.upstream_keyers.get(index).and_then(Option::as_ref)
    }
}
