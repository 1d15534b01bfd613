//! Builder API for models and machines.
//!
//! Declare states, pseudostates and transitions with [`ModelBuilder`],
//! then wrap the validated model in a running machine with
//! [`StateMachineBuilder`].

mod error;
mod machine;
mod macros;
mod model;
mod pseudostate;
mod state;
mod transition;

pub use error::BuildError;
pub use machine::StateMachineBuilder;
pub use model::ModelBuilder;
pub use pseudostate::{BranchBuilder, HistoryBuilder};
pub use state::{StateBuilder, DEFAULT_REGION};
pub use transition::TransitionBuilder;

use crate::core::{EventKey, StateContext, StateKey};

/// Helper function to create a simple event transition.
pub fn simple_transition<S, E, Env>(from: S, to: S, event: E) -> TransitionBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    TransitionBuilder::new().from(from).to(to).on(event)
}

/// Helper function to create a guarded event transition.
pub fn guarded_transition<S, E, Env, F>(from: S, to: S, event: E, predicate: F) -> TransitionBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
    F: Fn(&StateContext<S, E>) -> bool + Send + Sync + 'static,
{
    simple_transition(from, to, event).when(predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_event_transitions() {
        let plain = simple_transition::<String, String, ()>("A".into(), "B".into(), "go".into())
            .build()
            .unwrap();
        let guarded = guarded_transition::<String, String, (), _>("A".into(), "B".into(), "go".into(), |_| true)
            .build()
            .unwrap();

        assert!(plain.guard.is_none());
        assert!(plain.trigger.matches_event(&"go".to_string()));
        assert!(guarded.guard.is_some());
    }
}
