//! Builder for states.

use crate::core::{Action, EventKey, StateKey};
use std::collections::HashSet;

/// Region name used by [`StateBuilder::child_of`].
pub const DEFAULT_REGION: &str = "default";

/// Declares one state of the model.
///
/// The kind is derived when the model is built: a state that other states
/// name as their parent becomes composite (one region) or orthogonal (two
/// or more regions).
pub struct StateBuilder<S: StateKey, E: EventKey, Env> {
    pub(crate) key: S,
    pub(crate) parent: Option<(S, String)>,
    pub(crate) initial: bool,
    pub(crate) initial_actions: Vec<Action<S, E, Env>>,
    pub(crate) is_final: bool,
    pub(crate) entry: Vec<Action<S, E, Env>>,
    pub(crate) exit: Vec<Action<S, E, Env>>,
    pub(crate) deferred: HashSet<E>,
}

impl<S, E, Env> StateBuilder<S, E, Env>
where
    S: StateKey,
    E: EventKey,
    Env: Clone + Send + Sync + 'static,
{
    pub fn new(key: S) -> Self {
        Self {
            key,
            parent: None,
            initial: false,
            initial_actions: Vec::new(),
            is_final: false,
            entry: Vec::new(),
            exit: Vec::new(),
            deferred: HashSet::new(),
        }
    }

    /// Place the state in the default region of `parent`.
    pub fn child_of(self, parent: S) -> Self {
        self.in_region(parent, DEFAULT_REGION)
    }

    /// Place the state in the named region of `parent`.
    pub fn in_region(mut self, parent: S, region: impl Into<String>) -> Self {
        self.parent = Some((parent, region.into()));
        self
    }

    /// Make this state the target of its region's initial transition.
    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    /// Attach an action to the region's initial transition into this state.
    pub fn initial_action(mut self, action: Action<S, E, Env>) -> Self {
        self.initial = true;
        self.initial_actions.push(action);
        self
    }

    pub fn final_state(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn entry(mut self, action: Action<S, E, Env>) -> Self {
        self.entry.push(action);
        self
    }

    pub fn exit(mut self, action: Action<S, E, Env>) -> Self {
        self.exit.push(action);
        self
    }

    /// Defer `event` while this state is active and nothing accepts it.
    pub fn defer(mut self, event: E) -> Self {
        self.deferred.insert(event);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_of_uses_default_region() {
        let state: StateBuilder<String, String, ()> =
            StateBuilder::new("X".to_string()).child_of("P".to_string());

        assert_eq!(state.parent, Some(("P".to_string(), DEFAULT_REGION.to_string())));
    }

    #[test]
    fn initial_action_marks_initial() {
        let state: StateBuilder<String, String, ()> = StateBuilder::new("X".to_string())
            .initial_action(Action::set("booted", json!(true)))
            .defer("later".to_string())
            .defer("later".to_string());

        assert!(state.initial);
        assert_eq!(state.initial_actions.len(), 1);
        assert_eq!(state.deferred.len(), 1);
    }
}
