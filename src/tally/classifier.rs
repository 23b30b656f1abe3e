//! Path classification
//!
//! Turns one changed state path (e.g. `video.ME.0.programInput`) plus the
//! snapshot it refers to into at most one [`ChangeEvent`]. Paths are
//! classified independently: an irrelevant or malformed entry never stops
//! the rest of a batch from being processed.

use thiserror::Error;
use tracing::{trace, warn};

use super::types::{Bus, ChangeEvent};
use crate::switcher::SwitcherState;

/// Reasons a path that looks like tally-relevant video state cannot be used
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// A segment that must be an index is missing or not a number
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: &'static str },

    /// The path names a row or keyer that the snapshot does not contain
    #[error("path '{path}' refers to {what} {index}, which is not in the snapshot")]
    MissingInSnapshot {
        path: String,
        what: &'static str,
        index: usize,
    },
}

/// Classify a single changed path
///
/// Returns `Ok(None)` for paths that carry no tally meaning (audio, preview
/// changes, macro state, ...), `Err` for video paths that cannot be parsed or
/// resolved against the snapshot.
pub fn classify(path: &str, state: &SwitcherState) -> Result<Option<ChangeEvent>, ClassifyError> {
    let mut segments = path.split('.');

    if segments.next() != Some("video") {
        return Ok(None);
    }

    match segments.next() {
        Some("ME") | Some("mixEffects") => classify_mix_effect(path, segments, state),
        Some("downstreamKeyers") => classify_downstream_keyer(path, segments, state),
        _ => Ok(None),
    }
}

fn classify_mix_effect<'a>(
    path: &str,
    mut segments: impl Iterator<Item = &'a str>,
    state: &SwitcherState,
) -> Result<Option<ChangeEvent>, ClassifyError> {
    let index = parse_index(path, segments.next(), "mix-effect index")?;
    let field = segments.next();

    // Only fields that affect what is visibly on air
    if !matches!(
        field,
        Some("programInput") | Some("transitionPosition") | Some("upstreamKeyers")
    ) {
        return Ok(None);
    }

    let me_index = to_u8(path, index)?;
    let me = state
        .mix_effect(index)
        .ok_or_else(|| ClassifyError::MissingInSnapshot {
            path: path.to_string(),
            what: "mix-effect row",
            index,
        })?;

    let event = match field {
        Some("programInput") => ChangeEvent::ProgramChanged {
            me: me_index,
            source: me.program_input,
        },
        Some("transitionPosition") => ChangeEvent::TransitionPositionChanged {
            me: me_index,
            handle_position: me.transition_position.handle_position,
            program: me.program_input,
            preview: me.preview_input,
        },
        _ => {
            let keyer = parse_index(path, segments.next(), "upstream keyer index")?;
            let usk = me
                .upstream_keyer(keyer)
                .ok_or_else(|| ClassifyError::MissingInSnapshot {
                    path: path.to_string(),
                    what: "upstream keyer",
                    index: keyer,
                })?;
            ChangeEvent::KeyerOnAirChanged {
                bus: Bus::MixEffect(me_index),
                keyer: to_u8(path, keyer)?,
                fill_source: usk.fill_source,
                on_air: usk.on_air,
            }
        }
    };

    Ok(Some(event))
}

fn classify_downstream_keyer<'a>(
    path: &str,
    mut segments: impl Iterator<Item = &'a str>,
    state: &SwitcherState,
) -> Result<Option<ChangeEvent>, ClassifyError> {
    let index = parse_index(path, segments.next(), "downstream keyer index")?;
    let dsk = state
        .downstream_keyer(index)
        .ok_or_else(|| ClassifyError::MissingInSnapshot {
            path: path.to_string(),
            what: "downstream keyer",
            index,
        })?;

    // Any sub-path (onAir, sources, properties) re-reads the whole keyer
    Ok(Some(ChangeEvent::KeyerOnAirChanged {
        bus: Bus::Downstream(to_u8(path, index)?),
        keyer: 0,
        fill_source: dsk.sources.fill_source,
        on_air: dsk.on_air,
    }))
}

fn parse_index(path: &str, segment: Option<&str>, what: &'static str) -> Result<usize, ClassifyError> {
    segment
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| ClassifyError::Malformed {
            path: path.to_string(),
            reason: what,
        })
}

fn to_u8(path: &str, index: usize) -> Result<u8, ClassifyError> {
    u8::try_from(index).map_err(|_| ClassifyError::Malformed {
        path: path.to_string(),
        reason: "index out of range",
    })
}

/// Classify a batch of changed paths, preserving their order
///
/// Irrelevant paths are skipped silently, malformed ones are logged; neither
/// affects the classification of the remaining paths.
pub fn classify_batch<S: AsRef<str>>(paths: &[S], state: &SwitcherState) -> Vec<ChangeEvent> {
    let mut events = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        match classify(path, state) {
            Ok(Some(event)) => {
                trace!(path, ?event, "Classified path");
                events.push(event);
            }
            Ok(None) => trace!(path, "Ignoring path with no tally meaning"),
            Err(e) => warn!("Skipping path: {}", e),
        }
    }

    events
}
