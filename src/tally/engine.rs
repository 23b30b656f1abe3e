//! Tally state engine
//!
//! Owns the canonical set of on-air sources and the per-row transition
//! bookkeeping. Events are applied strictly in the order received; the result
//! of every batch is a true set difference against the previous on-air set.

use std::collections::BTreeMap;

use tracing::debug;

use super::types::{
    Bus, ChangeEvent, KeyerSlot, OnAirSet, Role, SourceId, SourceKey, TallyDelta, TransitionState,
};

/// Canonical on-air state for one switcher
///
/// # State
///
/// - `on_air`: every [`SourceKey`] currently visibly live
/// - `transitions`: per mix-effect row, whether a transition is in flight and
///   which source was last seen on program
/// - `keyers`: fill source held by each keyer slot that is on air
#[derive(Debug, Clone, Default)]
pub struct TallyEngine {
    on_air: OnAirSet,
    transitions: BTreeMap<u8, TransitionState>,
    keyers: BTreeMap<KeyerSlot, SourceId>,
}

impl TallyEngine {
    /// Create an engine with an empty baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Current on-air set
    pub fn on_air(&self) -> &OnAirSet {
        &self.on_air
    }

    /// Transition bookkeeping for a row (default if never seen)
    pub fn transition(&self, me: u8) -> TransitionState {
        self.transitions.get(&me).copied().unwrap_or_default()
    }

    /// Forget everything, including the last program of every row
    pub fn reset(&mut self) {
        self.on_air.clear();
        self.transitions.clear();
        self.keyers.clear();
    }

    /// Apply a batch of events in order and return what changed
    ///
    /// The new on-air set is available through [`TallyEngine::on_air`]
    /// afterwards.
    pub fn apply(&mut self, events: &[ChangeEvent]) -> TallyDelta {
        let previous = self.on_air.clone();

        for event in events {
            self.apply_event(event);
        }

        let delta = diff(&previous, &self.on_air);
        if !delta.is_empty() {
            debug!(
                on = delta.to_activate.len(),
                off = delta.to_deactivate.len(),
                live = self.on_air.len(),
                "On-air set changed"
            );
        }
        delta
    }

    fn apply_event(&mut self, event: &ChangeEvent) {
        match *event {
            ChangeEvent::ProgramChanged { me, source } => {
                self.set_program(me, source);
            }

            ChangeEvent::TransitionPositionChanged {
                me,
                handle_position,
                program,
                preview,
            } => {
                let in_transition = self.transition(me).in_transition;

                if handle_position == 0 {
                    // Complete: the switcher has already swapped program and
                    // preview, so drop whichever preview was shown mid-way
                    self.set_program(me, program);
                    self.on_air.retain(|k| {
                        !(k.bus == Bus::MixEffect(me) && k.role == Role::PreviewDuringTransition)
                    });
                    self.transitions.entry(me).or_default().in_transition = false;
                } else if !in_transition {
                    self.transitions.entry(me).or_default().in_transition = true;
                    self.set_program(me, program);
                    self.on_air.insert(SourceKey::preview(me, preview));
                } else {
                    // Still moving: preview already lit, only follow a program cut
                    self.set_program(me, program);
                }
            }

            ChangeEvent::KeyerOnAirChanged {
                bus,
                keyer,
                fill_source,
                on_air,
            } => {
                let slot = KeyerSlot { bus, keyer };
                if on_air {
                    if let Some(old) = self.keyers.insert(slot, fill_source) {
                        if old != fill_source {
                            self.release_fill(bus, old);
                        }
                    }
                    self.on_air.insert(SourceKey::keyer_fill(bus, fill_source));
                } else {
                    let held = self.keyers.remove(&slot);
                    self.release_fill(bus, fill_source);
                    if let Some(old) = held.filter(|old| *old != fill_source) {
                        self.release_fill(bus, old);
                    }
                }
            }
        }
    }

    /// Hand a row's program over to `source`, retiring the previous one
    fn set_program(&mut self, me: u8, source: SourceId) {
        let state = self.transitions.entry(me).or_default();
        let previous = state.last_program.replace(source);

        if let Some(old) = previous.filter(|old| *old != source) {
            self.on_air.remove(&SourceKey::program(me, old));
        }
        self.on_air.insert(SourceKey::program(me, source));
    }

    /// Take a keyer fill off air unless another keyer on the bus still shows it
    fn release_fill(&mut self, bus: Bus, source: SourceId) {
        let still_held = self
            .keyers
            .iter()
            .any(|(slot, fill)| slot.bus == bus && *fill == source);
        if !still_held {
            self.on_air.remove(&SourceKey::keyer_fill(bus, source));
        }
    }
}

/// Compute the true set difference between two on-air sets
///
/// Keys present in both sets produce nothing.
pub fn diff(previous: &OnAirSet, next: &OnAirSet) -> TallyDelta {
    TallyDelta {
        to_activate: next.difference(previous).copied().collect(),
        to_deactivate: previous.difference(next).copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(me: u8, source: u16) -> ChangeEvent {
        ChangeEvent::ProgramChanged {
            me,
            source: SourceId(source),
        }
    }

    fn position(me: u8, handle_position: u32, program: u16, preview: u16) -> ChangeEvent {
        ChangeEvent::TransitionPositionChanged {
            me,
            handle_position,
            program: SourceId(program),
            preview: SourceId(preview),
        }
    }

    fn keyer(bus: Bus, keyer: u8, fill: u16, on_air: bool) -> ChangeEvent {
        ChangeEvent::KeyerOnAirChanged {
            bus,
            keyer,
            fill_source: SourceId(fill),
            on_air,
        }
    }

    #[test]
    fn test_program_change_swaps_program_key() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 1)]);

        let delta = engine.apply(&[program(0, 3)]);
        assert_eq!(delta.to_activate, vec![SourceKey::program(0, SourceId(3))]);
        assert_eq!(delta.to_deactivate, vec![SourceKey::program(0, SourceId(1))]);
        assert_eq!(engine.transition(0).last_program, Some(SourceId(3)));
    }

    #[test]
    fn test_first_program_has_no_sentinel_deactivation() {
        let mut engine = TallyEngine::new();
        let delta = engine.apply(&[program(0, 4)]);
        assert_eq!(delta.to_activate, vec![SourceKey::program(0, SourceId(4))]);
        assert!(delta.to_deactivate.is_empty());
    }

    #[test]
    fn test_repeated_program_is_idempotent() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 2)]);
        assert!(engine.apply(&[program(0, 2)]).is_empty());
        assert!(engine.on_air().contains(&SourceKey::program(0, SourceId(2))));
    }

    #[test]
    fn test_transition_lights_program_and_preview_then_clears_preview() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 3)]);

        let delta = engine.apply(&[position(0, 10, 3, 5)]);
        assert_eq!(delta.to_activate, vec![SourceKey::preview(0, SourceId(5))]);
        assert!(delta.to_deactivate.is_empty());
        assert!(engine.transition(0).in_transition);

        // Intermediate positions do nothing
        assert!(engine.apply(&[position(0, 4000, 3, 5)]).is_empty());

        let delta = engine.apply(&[position(0, 0, 3, 5)]);
        assert!(delta.to_activate.is_empty());
        assert_eq!(delta.to_deactivate, vec![SourceKey::preview(0, SourceId(5))]);
        assert!(!engine.transition(0).in_transition);
        assert_eq!(
            engine.on_air().iter().copied().collect::<Vec<_>>(),
            vec![SourceKey::program(0, SourceId(3))]
        );
    }

    #[test]
    fn test_transition_completion_after_switcher_swap() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 3), position(0, 0, 3, 5)]);
        engine.apply(&[position(0, 5000, 3, 5)]);

        // At the end of a mix the switcher reports program=5, preview=3
        let delta = engine.apply(&[program(0, 5), position(0, 0, 5, 3)]);
        assert_eq!(delta.to_activate, vec![SourceKey::program(0, SourceId(5))]);
        assert_eq!(
            delta.to_deactivate,
            vec![
                SourceKey::program(0, SourceId(3)),
                SourceKey::preview(0, SourceId(5))
            ]
        );
        assert_eq!(
            engine.on_air().iter().copied().collect::<Vec<_>>(),
            vec![SourceKey::program(0, SourceId(5))]
        );
    }

    #[test]
    fn test_program_cut_during_transition_keeps_preview() {
        let mut engine = TallyEngine::new();
        engine.apply(&[position(0, 0, 3, 5)]);
        engine.apply(&[position(0, 2000, 3, 5)]);

        let delta = engine.apply(&[position(0, 2500, 4, 5)]);
        assert_eq!(delta.to_activate, vec![SourceKey::program(0, SourceId(4))]);
        assert_eq!(delta.to_deactivate, vec![SourceKey::program(0, SourceId(3))]);
        assert!(engine.on_air().contains(&SourceKey::preview(0, SourceId(5))));
    }

    #[test]
    fn test_upstream_keyer_on_and_off() {
        let mut engine = TallyEngine::new();
        let delta = engine.apply(&[keyer(Bus::MixEffect(1), 0, 7, true)]);
        let key = SourceKey::new(Bus::MixEffect(1), Role::UpstreamKeyerFill, SourceId(7));
        assert_eq!(delta.to_activate, vec![key]);

        let delta = engine.apply(&[keyer(Bus::MixEffect(1), 0, 7, false)]);
        assert_eq!(delta.to_deactivate, vec![key]);
        assert!(engine.on_air().is_empty());
    }

    #[test]
    fn test_keyer_off_without_prior_on_is_silent() {
        let mut engine = TallyEngine::new();
        assert!(engine.apply(&[keyer(Bus::Downstream(0), 0, 4, false)]).is_empty());
    }

    #[test]
    fn test_shared_fill_stays_lit_until_both_keyers_are_off() {
        let mut engine = TallyEngine::new();
        let bus = Bus::MixEffect(0);
        engine.apply(&[keyer(bus, 0, 6, true), keyer(bus, 1, 6, true)]);

        assert!(engine.apply(&[keyer(bus, 0, 6, false)]).is_empty());
        let delta = engine.apply(&[keyer(bus, 1, 6, false)]);
        assert_eq!(delta.to_deactivate, vec![SourceKey::keyer_fill(bus, SourceId(6))]);
    }

    #[test]
    fn test_fill_change_while_on_air_retires_old_fill() {
        let mut engine = TallyEngine::new();
        let bus = Bus::Downstream(1);
        engine.apply(&[keyer(bus, 0, 4, true)]);

        let delta = engine.apply(&[keyer(bus, 0, 8, true)]);
        assert_eq!(delta.to_activate, vec![SourceKey::keyer_fill(bus, SourceId(8))]);
        assert_eq!(delta.to_deactivate, vec![SourceKey::keyer_fill(bus, SourceId(4))]);
    }

    #[test]
    fn test_rows_are_independent() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 1), program(1, 1)]);
        let delta = engine.apply(&[program(1, 2)]);
        assert_eq!(delta.to_deactivate, vec![SourceKey::program(1, SourceId(1))]);
        assert!(engine.on_air().contains(&SourceKey::program(0, SourceId(1))));
    }

    #[test]
    fn test_diff_is_set_difference() {
        let a = SourceKey::program(0, SourceId(1));
        let b = SourceKey::program(0, SourceId(2));
        let c = SourceKey::preview(0, SourceId(3));
        let previous: OnAirSet = [a, b].into_iter().collect();
        let next: OnAirSet = [b, c].into_iter().collect();

        let delta = diff(&previous, &next);
        assert_eq!(delta.to_activate, vec![c]);
        assert_eq!(delta.to_deactivate, vec![a]);
    }

    #[test]
    fn test_reset_clears_last_program() {
        let mut engine = TallyEngine::new();
        engine.apply(&[program(0, 1)]);
        engine.reset();
        assert!(engine.on_air().is_empty());
        assert_eq!(engine.transition(0), TransitionState::default());
    }
}
