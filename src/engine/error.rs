//! Engine and machine error types.

use crate::checkpoint::CheckpointError;
use crate::core::{GuardError, RegionId, StateKey};
use crate::effects::ActionFailure;
use thiserror::Error;

/// Errors produced while processing a single event.
///
/// None of these stop the event loop. Resolution errors abort only the
/// transition that raised them; the rest are reported alongside a committed
/// transition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError<S: StateKey> {
    /// No branch guard held and the choice or junction has no default
    #[error("No branch of {vertex:?} matched and no default is declared")]
    UnresolvedChoice { vertex: S },

    /// A join still waits on some of its sources
    #[error("Join {join:?} never completed: waiting on {missing:?}")]
    JoinLeak {
        join: S,
        arrived: Vec<S>,
        missing: Vec<S>,
    },

    /// A guard raised; it was treated as false
    #[error("Guard of {transition} failed: {error}")]
    GuardEvaluation {
        transition: String,
        error: GuardError,
    },

    /// One or more actions failed; siblings still ran
    #[error("{} action(s) failed: {}", .0.len(), .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    ActionExecution(Vec<ActionFailure<S>>),

    /// The machine no longer accepts events
    #[error("State machine is disabled")]
    MachineDisabled,

    #[error("Resolution cycle through {vertex:?}")]
    ResolutionCycle { vertex: S },

    #[error("Resolution exceeded {limit} pseudostates")]
    ResolutionDepthExceeded { limit: usize },

    #[error("Reference to unknown vertex {vertex:?}")]
    DanglingReference { vertex: S },

    #[error("Region {region:?} has no initial transition")]
    MissingInitial { region: RegionId<S> },

    /// Targets disagree on which substate of a region to enter
    #[error("Targets {targets:?} conflict in region {region:?}")]
    RegionConflict {
        region: RegionId<S>,
        targets: Vec<S>,
    },

    #[error("Run to completion exceeded {limit} steps")]
    RunToCompletionExceeded { limit: usize },

    #[error("Deferred queue is full, dropped event")]
    DeferredOverflow,

    #[error("Persisting snapshot failed: {0}")]
    Persist(String),
}

impl<S: StateKey> EngineError<S> {
    /// True for errors that prevented a transition from committing.
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedChoice { .. }
                | Self::ResolutionCycle { .. }
                | Self::ResolutionDepthExceeded { .. }
                | Self::DanglingReference { .. }
                | Self::MissingInitial { .. }
                | Self::RegionConflict { .. }
        )
    }
}

/// Errors returned by the [`StateMachine`](super::StateMachine) handle.
#[derive(Debug, Error)]
pub enum MachineError<S: StateKey> {
    #[error("State machine is disabled")]
    Disabled,

    #[error("State machine already started")]
    AlreadyStarted,

    #[error("Initial transition failed: {0}")]
    Start(EngineError<S>),

    #[error("Restoring snapshot failed: {0}")]
    Restore(#[from] CheckpointError),
}
