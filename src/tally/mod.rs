//! Tally module - switcher state changes to tally light commands
//!
//! The pipeline for one change batch:
//! - `classifier` turns changed state paths into [`ChangeEvent`]s
//! - `engine` folds the events into the on-air set and yields a [`TallyDelta`]
//! - `dispatcher` maps keys to light addresses and drops redundant commands
//! - `pacer` spaces the resulting messages on the wire
//!
//! `reconciler` rebuilds everything from a full snapshot after a (re)connect,
//! and `actor` serializes all of it behind a [`TallyActorHandle`].

mod actor;
mod actor_handle;
pub mod classifier;
mod commands;
pub mod dispatcher;
pub mod engine;
pub mod pacer;
pub mod reconciler;
pub mod types;

pub use actor::TallyActor;
pub use actor_handle::TallyActorHandle;
pub use classifier::{classify, classify_batch, ClassifyError};
pub use commands::ActorCommand;
pub use dispatcher::{
    AddressTemplate, DispatchSettings, TallyAddress, TallyDispatcher, TemplateError,
};
pub use engine::{diff, TallyEngine};
pub use pacer::{Pacer, PacerHandle};
pub use reconciler::{reconcile, startup_paths};
pub use types::{
    Bus, ChangeEvent, KeyerSlot, OnAirSet, Role, SourceId, SourceKey, TallyCommand, TallyDelta,
    TransitionState,
};
