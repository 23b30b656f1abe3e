//! Tally type definitions
//!
//! Defines the identity of an on-air source, the semantic change events
//! derived from switcher paths, and the deltas/commands flowing out of the engine.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Switcher input number (camera, media player, color bar, ...)
///
/// Defaults to input 0 (black), which never carries a tally light.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SourceId(pub u16);

impl SourceId {
    /// Get the raw input number
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a source is used: a mix-effect row or a downstream keyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bus {
    /// Mix-effect row (program, transition preview, upstream keyers)
    MixEffect(u8),
    /// Downstream keyer
    Downstream(u8),
}

impl Bus {
    /// Keyers on a mix-effect row are upstream, everything else is downstream
    pub fn is_upstream(&self) -> bool {
        matches!(self, Bus::MixEffect(_))
    }

    /// Role of a keyer fill placed on this bus
    pub fn keyer_role(&self) -> Role {
        if self.is_upstream() {
            Role::UpstreamKeyerFill
        } else {
            Role::DownstreamKeyerFill
        }
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bus::MixEffect(i) => write!(f, "M{}", i),
            Bus::Downstream(i) => write!(f, "D{}", i),
        }
    }
}

/// On-air role of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Program,
    PreviewDuringTransition,
    UpstreamKeyerFill,
    DownstreamKeyerFill,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Program => write!(f, "program"),
            Role::PreviewDuringTransition => write!(f, "preview"),
            Role::UpstreamKeyerFill => write!(f, "usk"),
            Role::DownstreamKeyerFill => write!(f, "dsk"),
        }
    }
}

/// A source in a particular on-air role
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub bus: Bus,
    pub role: Role,
    pub source: SourceId,
}

impl SourceKey {
    pub fn new(bus: Bus, role: Role, source: SourceId) -> Self {
        Self { bus, role, source }
    }

    pub fn program(me: u8, source: SourceId) -> Self {
        Self::new(Bus::MixEffect(me), Role::Program, source)
    }

    pub fn preview(me: u8, source: SourceId) -> Self {
        Self::new(Bus::MixEffect(me), Role::PreviewDuringTransition, source)
    }

    pub fn keyer_fill(bus: Bus, source: SourceId) -> Self {
        Self::new(bus, bus.keyer_role(), source)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bus, self.role, self.source)
    }
}

/// A single keyer on a bus (USK `keyer` of an ME row, or a DSK with keyer 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyerSlot {
    pub bus: Bus,
    pub keyer: u8,
}

/// Sources currently visibly live, in a stable order
pub type OnAirSet = BTreeSet<SourceKey>;

/// Per mix-effect row transition bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionState {
    pub in_transition: bool,
    /// `None` until the first snapshot has been observed
    pub last_program: Option<SourceId>,
}

/// Semantic event derived from one changed switcher path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    ProgramChanged {
        me: u8,
        source: SourceId,
    },
    TransitionPositionChanged {
        me: u8,
        /// 0 means idle / complete
        handle_position: u32,
        program: SourceId,
        preview: SourceId,
    },
    KeyerOnAirChanged {
        bus: Bus,
        keyer: u8,
        fill_source: SourceId,
        on_air: bool,
    },
}

/// Keys that must be switched on and off after a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyDelta {
    pub to_activate: Vec<SourceKey>,
    pub to_deactivate: Vec<SourceKey>,
}

impl TallyDelta {
    pub fn is_empty(&self) -> bool {
        self.to_activate.is_empty() && self.to_deactivate.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_activate.len() + self.to_deactivate.len()
    }
}

/// Unit handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyCommand {
    pub key: SourceKey,
    /// Rendered destination address
    pub address: String,
    pub active: bool,
}
