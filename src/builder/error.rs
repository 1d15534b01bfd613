//! Build errors for model, transition and machine builders.

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use thiserror::Error;

/// Errors that can occur when building models and machines.
///
/// Keys are rendered with their `Debug` representation.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Initial state not specified. Mark a top-level state with .initial() or call .initial(target)")]
    MissingInitialState,

    #[error("Transition source state not specified. Call .from(state)")]
    MissingFromState,

    #[error("Transition target not specified. Call .to(vertex) or .internal()")]
    MissingToState,

    #[error("Vertex {0} is declared more than once")]
    DuplicateVertex(String),

    #[error("State {state} names unknown parent {parent}")]
    UnknownParent { state: String, parent: String },

    #[error("Region {region} of {owner} does not exist")]
    UnknownRegion { owner: String, region: String },

    #[error("State hierarchy through {0} is cyclic")]
    CyclicHierarchy(String),

    #[error("Region {0} has more than one initial transition")]
    MultipleInitials(String),

    #[error("Final state {0} cannot own regions")]
    InvalidFinal(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Timed transition {0} needs a non-zero period")]
    InvalidTimer(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Restore snapshot does not fit the model: {0}")]
    Restore(#[from] CheckpointError),
}
