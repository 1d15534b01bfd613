//! Read-only context handed to guards and actions.

use super::key::{EventKey, StateKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extended state: user-scoped variables carried by a running machine.
pub type Variables = BTreeMap<String, Value>;

/// Where in the processing step a guard or action is being invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Evaluating a transition or branch guard
    Guard,
    /// Running exit actions of a state being left
    Exit,
    /// Running actions attached to a transition or pseudostate branch
    Transition,
    /// Running entry actions of a state being entered
    Entry,
    /// Running actions of a region's initial transition
    Initial,
}

/// Read-only view of the step in progress.
///
/// Contexts are built by the engine for every guard evaluation and every
/// action invocation. They are owned snapshots: guards and actions may clone
/// what they need into the effects they return.
#[derive(Clone, Debug)]
pub struct StateContext<S: StateKey, E: EventKey> {
    stage: Stage,
    event: Option<E>,
    payload: Option<Value>,
    source: Option<S>,
    target: Option<S>,
    state: Option<S>,
    transition: Option<String>,
    variables: Variables,
}

impl<S: StateKey, E: EventKey> StateContext<S, E> {
    pub(crate) fn new(stage: Stage, variables: Variables) -> Self {
        Self {
            stage,
            event: None,
            payload: None,
            source: None,
            target: None,
            state: None,
            transition: None,
            variables,
        }
    }

    pub(crate) fn with_event(mut self, event: Option<E>, payload: Option<Value>) -> Self {
        self.event = event;
        self.payload = payload;
        self
    }

    pub(crate) fn with_transition(
        mut self,
        source: Option<S>,
        target: Option<S>,
        name: Option<String>,
    ) -> Self {
        self.source = source;
        self.target = target;
        self.transition = name;
        self
    }

    /// Replace the target, once resolution has found the concrete one.
    pub(crate) fn retarget(mut self, target: S) -> Self {
        self.target = Some(target);
        self
    }

    pub(crate) fn at(&self, stage: Stage, state: Option<S>, variables: &Variables) -> Self {
        let mut ctx = self.clone();
        ctx.stage = stage;
        ctx.state = state;
        ctx.variables = variables.clone();
        ctx
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The triggering event, absent for completion, timer and initial steps.
    pub fn event(&self) -> Option<&E> {
        self.event.as_ref()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Source state of the transition being taken.
    pub fn source(&self) -> Option<&S> {
        self.source.as_ref()
    }

    /// Declared target of the transition, which may be a pseudostate.
    pub fn target(&self) -> Option<&S> {
        self.target.as_ref()
    }

    /// The state being entered or exited during entry and exit stages.
    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    pub fn transition_name(&self) -> Option<&str> {
        self.transition.as_deref()
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_methods_populate_view() {
        let mut vars = Variables::new();
        vars.insert("count".to_string(), json!(2));

        let ctx: StateContext<String, String> = StateContext::new(Stage::Guard, vars)
            .with_event(Some("go".to_string()), Some(json!({"speed": 3})))
            .with_transition(Some("A".to_string()), Some("B".to_string()), Some("a-to-b".into()));

        assert_eq!(ctx.stage(), Stage::Guard);
        assert_eq!(ctx.event().map(String::as_str), Some("go"));
        assert_eq!(ctx.payload().unwrap()["speed"], json!(3));
        assert_eq!(ctx.source().map(String::as_str), Some("A"));
        assert_eq!(ctx.target().map(String::as_str), Some("B"));
        assert_eq!(ctx.transition_name(), Some("a-to-b"));
        assert_eq!(ctx.variable("count"), Some(&json!(2)));
        assert!(ctx.state().is_none());
    }

    #[test]
    fn at_rebinds_stage_state_and_variables() {
        let base: StateContext<String, String> = StateContext::new(Stage::Guard, Variables::new());
        let mut vars = Variables::new();
        vars.insert("seen".to_string(), json!(true));

        let entry = base.at(Stage::Entry, Some("B".to_string()), &vars);

        assert_eq!(entry.stage(), Stage::Entry);
        assert_eq!(entry.state().map(String::as_str), Some("B"));
        assert_eq!(entry.variable("seen"), Some(&json!(true)));
        assert!(base.variable("seen").is_none());
    }

    #[test]
    fn retarget_keeps_source_and_name() {
        let ctx: StateContext<String, String> = StateContext::new(Stage::Transition, Variables::new())
            .with_transition(Some("A".to_string()), Some("pick".to_string()), Some("route".into()))
            .retarget("B".to_string());

        assert_eq!(ctx.source().map(String::as_str), Some("A"));
        assert_eq!(ctx.target().map(String::as_str), Some("B"));
        assert_eq!(ctx.transition_name(), Some("route"));
    }
}
