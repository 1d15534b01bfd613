//! Pseudostates: routing vertices that are never active themselves.

use super::action::Action;
use super::guard::Guard;
use super::key::{EventKey, StateKey};
use super::state::RegionId;
use serde::{Deserialize, Serialize};

/// Depth of a history pseudostate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryDepth {
    /// Restore the region's direct substate, then enter it by default
    Shallow,
    /// Restore the full nested configuration below the region
    Deep,
}

/// Tag describing what a pseudostate does during resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoStateKind {
    Initial,
    Choice,
    Junction,
    Fork,
    Join,
    History(HistoryDepth),
    End,
    EntryPoint,
    ExitPoint,
}

/// One guarded outgoing branch of a choice or junction.
pub struct Branch<S: StateKey, E: EventKey, Env> {
    /// `None` only for the default branch
    pub guard: Option<Guard<S, E, Env>>,
    pub target: S,
    pub actions: Vec<Action<S, E, Env>>,
}

impl<S: StateKey, E: EventKey, Env> Clone for Branch<S, E, Env> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
            target: self.target.clone(),
            actions: self.actions.clone(),
        }
    }
}

/// A routing vertex of the model.
///
/// Initial pseudostates are owned by their region (see
/// [`Initial`](super::state::Initial)) and never appear here.
pub enum PseudoState<S: StateKey, E: EventKey, Env> {
    /// Dynamic conditional branch; guards evaluated in declaration order
    Choice {
        branches: Vec<Branch<S, E, Env>>,
        default: Option<Branch<S, E, Env>>,
    },
    /// Static conditional branch; same resolution rules as choice
    Junction {
        branches: Vec<Branch<S, E, Env>>,
        default: Option<Branch<S, E, Env>>,
    },
    /// Splits into one target per orthogonal region
    Fork { targets: Vec<S> },
    /// Merges arrivals from every source before continuing to `target`
    Join { sources: Vec<S>, target: S },
    /// Remembers the last active content of `region`
    History {
        depth: HistoryDepth,
        region: RegionId<S>,
        default: Option<S>,
    },
    /// Terminates the machine
    End,
    /// Routes a transition into a composite state
    EntryPoint { target: S },
    /// Routes a transition out of a composite state
    ExitPoint { target: S },
}

impl<S: StateKey, E: EventKey, Env> PseudoState<S, E, Env> {
    pub fn kind(&self) -> PseudoStateKind {
        match self {
            Self::Choice { .. } => PseudoStateKind::Choice,
            Self::Junction { .. } => PseudoStateKind::Junction,
            Self::Fork { .. } => PseudoStateKind::Fork,
            Self::Join { .. } => PseudoStateKind::Join,
            Self::History { depth, .. } => PseudoStateKind::History(*depth),
            Self::End => PseudoStateKind::End,
            Self::EntryPoint { .. } => PseudoStateKind::EntryPoint,
            Self::ExitPoint { .. } => PseudoStateKind::ExitPoint,
        }
    }

    /// Every vertex this pseudostate may route to.
    pub fn referenced(&self) -> Vec<&S> {
        match self {
            Self::Choice { branches, default } | Self::Junction { branches, default } => branches
                .iter()
                .chain(default.iter())
                .map(|b| &b.target)
                .collect(),
            Self::Fork { targets } => targets.iter().collect(),
            Self::Join { sources, target } => sources.iter().chain(Some(target)).collect(),
            Self::History { default, .. } => default.iter().collect(),
            Self::End => Vec::new(),
            Self::EntryPoint { target } | Self::ExitPoint { target } => vec![target],
        }
    }
}
